use crate::error::Result;
use crate::workbook::{CellValue, Sheet, Workbook};

/// Convert a sheet to CSV text.
///
/// Every row of the sheet is written, header first. Values containing
/// commas, quotes or newlines are quoted and inner quotes doubled.
///
/// # Examples
/// ```
/// use grant_portal::downloader::to_csv;
/// use grant_portal::workbook::Sheet;
///
/// let mut sheet = Sheet::new("Projects", &["title", "funder"]);
/// sheet.push_row(vec!["Clean water".into(), "Fund, Inc".into()]);
/// assert_eq!(to_csv(&sheet), "title,funder\nClean water,\"Fund, Inc\"\n");
/// ```
pub fn to_csv(sheet: &Sheet) -> String {
    let mut csv_content = String::new();

    for row in &sheet.rows {
        for (c, cell) in row.iter().enumerate() {
            if c > 0 {
                csv_content.push(',');
            }

            let value = cell.as_text();
            if value.contains([',', '"', '\n', '\r']) {
                let escaped = value.replace('"', "\"\"");
                csv_content.push_str(&format!("\"{}\"", escaped));
            } else {
                csv_content.push_str(&value);
            }
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert a workbook to XLSX bytes.
///
/// Header rows are bold. Numeric cells use the sheet's number format when it
/// has one; dates are written as `DD/Mon/YYYY` text so a re-import reads
/// exactly what the user saw.
#[cfg(feature = "xlsx")]
pub fn to_xlsx(book: &Workbook) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};

    let mut workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    for sheet in &book.sheets {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(&sheet.name)?;
        let number_format = sheet
            .number_format
            .as_deref()
            .map(|f| Format::new().set_num_format(f));

        for (r, row) in sheet.rows.iter().enumerate() {
            let r = r as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                if r == 0 {
                    worksheet.write_string_with_format(r, c, &cell.as_text(), &header_format)?;
                    continue;
                }
                match cell {
                    CellValue::Empty => {}
                    CellValue::Text(s) => {
                        worksheet.write_string(r, c, s)?;
                    }
                    CellValue::Number(n) => match &number_format {
                        Some(format) => {
                            worksheet.write_number_with_format(r, c, *n, format)?;
                        }
                        None => {
                            worksheet.write_number(r, c, *n)?;
                        }
                    },
                    CellValue::Bool(b) => {
                        worksheet.write_boolean(r, c, *b)?;
                    }
                    CellValue::Date(d) => {
                        worksheet.write_string(r, c, &crate::format::fmt_date(*d))?;
                    }
                    CellValue::DateTime(dt) => {
                        worksheet.write_string(r, c, &crate::format::fmt_date(dt.date()))?;
                    }
                }
            }
        }

        workbook.push_worksheet(worksheet);
    }

    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

#[cfg(not(feature = "xlsx"))]
pub fn to_xlsx(_book: &Workbook) -> Result<Vec<u8>> {
    Err(crate::error::PortalError::MissingDependency {
        feature: "xlsx",
        package: "rust_xlsxwriter",
    })
}
