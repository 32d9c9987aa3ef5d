//! Error type shared by every portal operation.
//!
//! Each variant corresponds to one class of failure a user action can hit:
//! form validation, unknown identifiers, spreadsheet parsing, formats that
//! were compiled out, and the I/O underneath snapshots and exports.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PortalError>;

#[derive(Debug, Error)]
pub enum PortalError {
    /// A submitted form failed validation. Nothing was mutated.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("{what} already exists")]
    Duplicate { what: String },

    /// The uploaded spreadsheet could not be reconciled.
    #[error("Import failed at {sheet}!{cell}: {message}")]
    Import {
        sheet: String,
        cell: String,
        message: String,
    },

    #[error("{feature} export requires the '{package}' package (enable the '{feature}' feature)")]
    MissingDependency {
        feature: &'static str,
        package: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet read error: {0}")]
    Calamine(#[from] calamine::XlsxError),

    #[error("Template error: {0}")]
    Template(String),
}

impl PortalError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PortalError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        PortalError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn import(
        sheet: impl Into<String>,
        cell: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PortalError::Import {
            sheet: sheet.into(),
            cell: cell.into(),
            message: message.into(),
        }
    }
}
