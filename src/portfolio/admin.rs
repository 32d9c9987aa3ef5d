use chrono::NaiveDate;
use log::info;
use serde::Serialize;

use super::store::{ProjectInput, validate_project};
use super::{DEFAULT_OVERHEAD_RATE, PortfolioStore, Project, ProjectStatus, RowId};
use crate::downloader::to_csv;
use crate::error::{PortalError, Result};
use crate::format::{DateOrder, parse_date_like};
use crate::workbook::{CellValue, Record, Sheet, Table};

/// Column order of the project admin CSV.
pub const PROJECT_FIELDS: [&str; 11] = [
    "id",
    "title",
    "description",
    "start_date",
    "end_date",
    "status",
    "manager_user",
    "funder",
    "overhead_rate",
    "notes",
    "revised_on",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
}

fn iso(date: NaiveDate) -> CellValue {
    CellValue::Text(date.format("%Y-%m-%d").to_string())
}

pub fn projects_sheet(store: &PortfolioStore) -> Sheet {
    let mut sheet = Sheet::new("projects", &PROJECT_FIELDS);
    for project in store.projects.values() {
        sheet.push_row(vec![
            CellValue::Number(project.id as f64),
            project.title.clone().into(),
            project.description.clone().into(),
            iso(project.start_date),
            iso(project.end_date),
            project.status.as_str().into(),
            project.manager_user.clone().into(),
            project.funder.clone().into(),
            CellValue::Number(project.overhead_rate),
            project.notes.clone().into(),
            project.revised_on.map(iso).unwrap_or_default(),
        ]);
    }
    sheet
}

pub fn export_projects_csv(store: &PortfolioStore) -> String {
    to_csv(&projects_sheet(store))
}

fn bad_cell(table: &Table<'_>, record: &Record<'_>, field: &str, message: impl Into<String>) -> PortalError {
    PortalError::import(table.sheet_name(), record.cell_ref(&[field]), message)
}

fn read_date(table: &Table<'_>, record: &Record<'_>, field: &str, order: DateOrder) -> Result<Option<NaiveDate>> {
    let value = record.get(&[field]);
    if value.is_empty() {
        return Ok(None);
    }
    parse_date_like(value, order)
        .map(Some)
        .ok_or_else(|| bad_cell(table, record, field, format!("'{}' is not a date", value.as_text())))
}

fn read_project(
    store: &PortfolioStore,
    table: &Table<'_>,
    record: &Record<'_>,
    today: NaiveDate,
    order: DateOrder,
) -> Result<(Option<RowId>, Project)> {
    for field in ["title", "start_date", "end_date", "manager_user", "funder"] {
        if record.get(&[field]).is_empty() {
            return Err(bad_cell(table, record, field, format!("{} is required", field)));
        }
    }

    let id_cell = record.get(&["id"]);
    let id = match id_cell.as_f64() {
        _ if id_cell.is_empty() => None,
        Some(n) if n >= 1.0 && n.fract() == 0.0 => Some(n as RowId),
        _ => {
            return Err(bad_cell(
                table,
                record,
                "id",
                format!("'{}' is not a row id", id_cell.as_text()),
            ));
        }
    };
    let existing = id.and_then(|id| store.projects.get(&id));

    let status_text = record.text(&["status"]);
    let status = if status_text.is_empty() {
        existing.map(|p| p.status).unwrap_or_default()
    } else {
        ProjectStatus::parse(&status_text).ok_or_else(|| {
            let allowed: Vec<&str> = ProjectStatus::ALL.iter().map(|s| s.as_str()).collect();
            bad_cell(
                table,
                record,
                "status",
                format!("'{}' is not one of {}", status_text, allowed.join(", ")),
            )
        })?
    };

    let overhead_cell = record.get(&["overhead_rate"]);
    let overhead_rate = if overhead_cell.is_empty() {
        existing.map_or(DEFAULT_OVERHEAD_RATE, |p| p.overhead_rate)
    } else {
        overhead_cell.as_f64().ok_or_else(|| {
            bad_cell(
                table,
                record,
                "overhead_rate",
                format!("'{}' is not a number", overhead_cell.as_text()),
            )
        })?
    };

    // Required columns were checked above, so both dates are present.
    let start_date = read_date(table, record, "start_date", order)?;
    let end_date = read_date(table, record, "end_date", order)?;
    let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
        return Err(bad_cell(table, record, "start_date", "dates are required"));
    };
    let revised_on = read_date(table, record, "revised_on", order)?.unwrap_or(today);

    let project = Project {
        id: existing.map_or(0, |p| p.id),
        title: record.text(&["title"]),
        description: record.text(&["description"]),
        start_date,
        end_date,
        status,
        manager_user: record.text(&["manager_user"]),
        funder: record.text(&["funder"]),
        overhead_rate,
        notes: record.text(&["notes"]),
        revised_on: Some(revised_on),
    };

    validate_project(&ProjectInput::from(&project)).map_err(|e| match e {
        PortalError::Validation { field, message } => bad_cell(table, record, &field, message),
        other => other,
    })?;

    Ok((existing.map(|p| p.id), project))
}

/// Apply a project sheet to the store: rows whose `id` names an existing
/// project update it, every other row creates a new project.
///
/// Every row is checked before anything is written; one bad row rejects the
/// whole sheet.
pub fn upsert_projects(
    store: &mut PortfolioStore,
    sheet: &Sheet,
    today: NaiveDate,
    order: DateOrder,
) -> Result<UpsertSummary> {
    let table = sheet.table();
    if !table.has_column("title") {
        return Err(PortalError::import(
            &sheet.name,
            "A1",
            "expected headers: ".to_string() + &PROJECT_FIELDS.join(","),
        ));
    }

    let mut rows = Vec::new();
    for record in table.records() {
        rows.push(read_project(store, &table, &record, today, order)?);
    }

    let mut summary = UpsertSummary::default();
    for (existing, mut project) in rows {
        match existing {
            Some(_) => summary.updated += 1,
            None => {
                project.id = store.next_row_id();
                summary.created += 1;
            }
        }
        store.put_project(project);
    }

    info!(
        "project upsert: {} created, {} updated",
        summary.created, summary.updated
    );
    Ok(summary)
}
