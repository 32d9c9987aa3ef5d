//! In-memory tabular sink.
//!
//! Exports are assembled here first and flushed once by
//! [`crate::downloader`]; imports are read into the same structure by
//! [`crate::loader`] before reconciliation. The first row of every sheet is
//! its header.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single typed cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering used when a cell is read as a string.
    ///
    /// Whole numbers print without a fractional part so that a numeric
    /// baseline of `10` comes back as "10", not "10.0".
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Bool(b) => if *b { "Yes" } else { "No" }.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric view. Text is trimmed and parsed; anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
    /// Excel number format applied to numeric cells, e.g. `"0.00"`.
    pub number_format: Option<String>,
}

impl Sheet {
    /// A sheet with only its header row.
    pub fn new(name: &str, headers: &[&str]) -> Self {
        Sheet {
            name: name.to_string(),
            rows: vec![headers.iter().map(|h| CellValue::from(*h)).collect()],
            number_format: None,
        }
    }

    pub fn with_number_format(mut self, format: &str) -> Self {
        self.number_format = Some(format.to_string());
        self
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    /// Number of data rows, header excluded.
    pub fn data_len(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn table(&self) -> Table<'_> {
        let mut columns = HashMap::new();
        if let Some(header) = self.rows.first() {
            for (idx, cell) in header.iter().enumerate() {
                let key = normalize_header(&cell.as_text());
                if !key.is_empty() {
                    columns.entry(key).or_insert(idx);
                }
            }
        }
        Table {
            sheet: self,
            columns,
        }
    }
}

fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Header-indexed view over a sheet.
pub struct Table<'a> {
    sheet: &'a Sheet,
    columns: HashMap<String, usize>,
}

impl<'a> Table<'a> {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(&normalize_header(name))
    }

    /// First of `names` present in the header.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|n| self.columns.get(&normalize_header(n)).copied())
    }

    /// Data rows with their 1-based sheet row number. Fully blank rows are skipped.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.sheet
            .rows
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, row)| !row.iter().all(CellValue::is_empty))
            .map(move |(idx, cells)| Record {
                table: self,
                cells,
                row: idx + 1,
            })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet.name
    }
}

pub struct Record<'a> {
    table: &'a Table<'a>,
    cells: &'a [CellValue],
    /// 1-based row number in the sheet.
    pub row: usize,
}

impl<'a> Record<'a> {
    /// Cell under the first matching header, `Empty` when absent.
    pub fn get(&self, names: &[&str]) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.table
            .column(names)
            .and_then(|idx| self.cells.get(idx))
            .unwrap_or(EMPTY)
    }

    pub fn text(&self, names: &[&str]) -> String {
        self.get(names).as_text()
    }

    /// Spreadsheet reference ("F7") of the cell under `names`, for error messages.
    pub fn cell_ref(&self, names: &[&str]) -> String {
        let col = self.table.column(names).unwrap_or(0);
        format!("{}{}", column_to_letter(col as u16 + 1), self.row)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    pub fn add_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    /// Sheet by name, ignoring case and surrounding blanks.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        let wanted = normalize_header(name);
        self.sheets
            .iter()
            .find(|s| normalize_header(&s.name) == wanted)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Convert column number to letter (A=1, B=2, ..., Z=26, AA=27).
pub fn column_to_letter(col: u16) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}
