use std::path::Path;

use crate::error::{PortalError, Result};
use crate::workbook::{CellValue, Sheet, Workbook};

/// Load a single sheet from CSV text.
///
/// Quoted fields may contain commas, doubled quotes and line breaks. Blank
/// lines are skipped.
///
/// # Examples
/// ```
/// use grant_portal::loader::from_csv_str;
///
/// let sheet = from_csv_str("Projects", "title,funder\n\"Water, phase 2\",GLIDE\n");
/// assert_eq!(sheet.rows.len(), 2);
/// assert_eq!(sheet.rows[1][0].as_text(), "Water, phase 2");
/// ```
pub fn from_csv_str(name: &str, content: &str) -> Sheet {
    let rows = parse_csv_records(content)
        .into_iter()
        .filter(|record| !(record.len() == 1 && record[0].trim().is_empty()))
        .map(|record| {
            record
                .into_iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field)
                    }
                })
                .collect()
        })
        .collect();

    Sheet {
        name: name.to_string(),
        rows,
        number_format: None,
    }
}

// Split CSV text into records; a row only ends on a line break outside quotes
fn parse_csv_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                record.push(std::mem::take(&mut current_field));
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut current_field));
                records.push(std::mem::take(&mut record));
            }
            _ => {
                current_field.push(c);
            }
        }
    }

    // Last record without a trailing newline
    if !current_field.is_empty() || !record.is_empty() {
        record.push(current_field);
        records.push(record);
    }

    records
}

/// Load every sheet of an XLSX file held in memory.
#[cfg(feature = "xlsx")]
pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<Workbook> {
    use calamine::{Data, Reader, Xlsx};
    use std::io::Cursor;

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))?;
    let mut book = Workbook::new();

    for sheet_name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet_name)?;
        let rows = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Data::Int(i) => CellValue::Number(*i as f64),
                        Data::Float(f) => CellValue::Number(*f),
                        Data::String(s) => CellValue::Text(s.clone()),
                        Data::Bool(b) => CellValue::Bool(*b),
                        Data::DateTime(dt) => crate::format::from_excel_serial(dt.as_f64())
                            .map(CellValue::DateTime)
                            .unwrap_or(CellValue::Empty),
                        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
                        // Error cells and blanks carry nothing usable
                        _ => CellValue::Empty,
                    })
                    .collect()
            })
            .collect();

        book.add_sheet(Sheet {
            name: sheet_name,
            rows,
            number_format: None,
        });
    }

    Ok(book)
}

#[cfg(not(feature = "xlsx"))]
pub fn from_xlsx_bytes(_bytes: &[u8]) -> Result<Workbook> {
    Err(PortalError::MissingDependency {
        feature: "xlsx",
        package: "calamine",
    })
}

/// Detect file type and load appropriate format.
///
/// A `.csv` file becomes a one-sheet workbook named after the file stem.
///
/// # Examples
/// ```no_run
/// use grant_portal::loader::load_workbook;
///
/// match load_workbook("application.xlsx") {
///     Ok(book) => println!("Loaded sheets: {:?}", book.sheet_names()),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_workbook(filepath: impl AsRef<Path>) -> Result<Workbook> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => {
            let content = std::fs::read_to_string(path)?;
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Sheet1");
            let mut book = Workbook::new();
            book.add_sheet(from_csv_str(name, &content));
            Ok(book)
        }
        Some("xlsx") => {
            let bytes = std::fs::read(path)?;
            from_xlsx_bytes(&bytes)
        }
        Some(ext) => Err(PortalError::validation(
            "file",
            format!("Unsupported file extension: {}", ext),
        )),
        None => Err(PortalError::validation("file", "File has no extension")),
    }
}
