//! Display/parse helpers for labels, dates and money.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::NodeKind;
use crate::workbook::CellValue;

lazy_static! {
    static ref LABEL_PREFIX_REGEX: Regex = Regex::new(
        r"(?is)^\s*(goal|outcome|output|kpi|activity)\s*(?:[0-9]+(?:\.[0-9]+)*\s*[—–:\-]|[—–])\s*(.*)$"
    )
    .unwrap();
}

/// Which of `DD/MM/YYYY` and `MM/DD/YYYY` wins for an ambiguous date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

impl DateOrder {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "day-first" | "dmy" => Some(DateOrder::DayFirst),
            "month-first" | "mdy" => Some(DateOrder::MonthFirst),
            _ => None,
        }
    }

    fn formats(&self) -> [&'static str; 6] {
        let (first, second) = match self {
            DateOrder::DayFirst => ("%d/%m/%Y", "%m/%d/%Y"),
            DateOrder::MonthFirst => ("%m/%d/%Y", "%d/%m/%Y"),
        };
        ["%Y-%m-%d", first, second, "%Y/%m/%d", "%d/%b/%Y", "%d-%b-%Y"]
    }
}

/// Remove a display label such as `"KPI 1.2 — "` from the start of `text`.
///
/// The number may be missing when the separator is a dash, matching the
/// label of an unnumbered item (`"KPI — "`). Only a label of the given kind is stripped; anything else is returned
/// trimmed but otherwise untouched.
pub fn strip_label_prefix(text: &str, kind: NodeKind) -> String {
    if let Some(caps) = LABEL_PREFIX_REGEX.captures(text) {
        if caps[1].eq_ignore_ascii_case(kind.label()) {
            return caps[2].trim().to_string();
        }
    }
    text.trim().to_string()
}

/// Interpret a cell as a calendar date.
///
/// Text is tried against a fixed list of formats, each with an optional
/// time-of-day suffix; the first success wins. `order` decides whether the
/// day-first or month-first slash format is tried first.
pub fn parse_date_like(value: &CellValue, order: DateOrder) -> Option<NaiveDate> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Text(s) => parse_date_str(s, order),
        CellValue::Empty | CellValue::Number(_) | CellValue::Bool(_) => None,
    }
}

pub fn parse_date_str(value: &str, order: DateOrder) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if matches!(value.to_lowercase().as_str(), "none" | "nan" | "nat") {
        return None;
    }

    for format in order.formats() {
        for time_sep in [" ", "T"] {
            let with_time = format!("{}{}%H:%M:%S", format, time_sep);
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, &with_time) {
                return Some(dt.date());
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return Some(d);
        }
    }
    None
}

/// Convert a spreadsheet serial timestamp (days since 1899-12-30) to a datetime.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

pub fn fmt_date(date: NaiveDate) -> String {
    date.format("%d/%b/%Y").to_string()
}

/// Render as `DD/Mon/YYYY`, or an empty string when the value is not a date.
pub fn fmt_dd_mmm_yyyy(value: &CellValue, order: DateOrder) -> String {
    parse_date_like(value, order).map(fmt_date).unwrap_or_default()
}

pub fn fmt_opt_date(date: Option<NaiveDate>) -> String {
    date.map(fmt_date).unwrap_or_default()
}

/// Money with `.` thousands and `,` decimals (`1.234.567,89`), independent of locale.
pub fn fmt_money(value: &CellValue) -> String {
    value.as_f64().map(fmt_amount).unwrap_or_default()
}

pub fn fmt_amount(amount: f64) -> String {
    if !amount.is_finite() {
        return String::new();
    }
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let negative = amount < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    format!("{}{},{}", if negative { "-" } else { "" }, grouped, frac_part)
}

/// Parse a yes/no style cell.
pub fn parse_flag(value: &CellValue) -> bool {
    match value {
        CellValue::Bool(b) => *b,
        CellValue::Number(n) => *n != 0.0,
        other => matches!(
            other.as_text().to_lowercase().as_str(),
            "yes" | "y" | "true" | "1" | "x"
        ),
    }
}
