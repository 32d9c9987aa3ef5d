/*!
# Grant Portal

A grant application portal built around a logical framework ("logframe"):
a Goal, the Outcome it leads to, the Outputs that deliver it, KPIs that
measure each Output, plus a workplan of Activities and a Budget.

## Overview

An applicant fills the hierarchy through forms, then downloads it as a
multi-sheet workbook or as a formatted logframe document. A workbook
downloaded earlier (or edited offline) can be uploaded again and is
reconciled back into the hierarchy by matching names, since the export does
not carry internal identifiers. A second, relational part of the portal
tracks a portfolio of funded projects with reporting periods, indicator
targets and actuals, activities, budgets and strategic alignment.

## Architecture

### Domain Layer
- **Hierarchy Store** (`logframe`) - Goal → Outcome → Output → KPI plus
  Activities and Budget lines, with validation and cascading deletes
- **Numbering Engine** (`numbering`) - dotted display numbers (`1`, `1.2`)
  recomputed on every render, never stored
- **Formatters** (`format`) - label prefix stripping, tolerant date parsing,
  `DD/Mon/YYYY` dates and `1.234.567,89` amounts
- **Portfolio** (`portfolio`) - integer-keyed project tables, reporting
  periods, dashboard views and a CSV admin round trip

### Exchange Layer
- **Workbook** (`workbook`) - in-memory sheets of typed cells
- **Export Builder** (`export`) - Identification, Summary, KPI Matrix,
  Workplan and Budget sheets; logframe document rendered with Handlebars
- **Import Reconciler** (`import`) - rebuilds the hierarchy from a workbook
- **Writers / readers** (`downloader`, `loader`) - XLSX via rust_xlsxwriter
  and calamine, CSV by hand

### Persistence Layer
- Gzip compressed bincode snapshots (`saving`) for session logframes and
  the portfolio store

### Web Layer
- axum router (`app`, feature `web`) with one logframe per browser session
  and a shared portfolio

## Cargo features

- `xlsx` (default) - spreadsheet export and import
- `docs` (default) - HTML logframe document
- `web` - HTTP server binary

## REST API Endpoints

- `/api/logframe` - current session hierarchy with numbering
- `/api/goals`, `/api/outcomes`, `/api/outputs`, `/api/kpis`,
  `/api/activities`, `/api/budget` - create, edit and delete
- `/api/export/xlsx`, `/api/export/document` - downloads
- `/api/import` - upload a workbook (multipart field `file`)
- `/api/portfolio/...` - projects, framework, indicators, periods, dashboard
- `/api/admin/projects.csv`, `/api/admin/projects` - project CSV round trip
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod export;
pub mod format;
pub mod ids;
pub mod import;
pub mod loader;
pub mod logframe;
pub mod model;
pub mod numbering;
pub mod portfolio;
pub mod saving;
pub mod workbook;

#[cfg(feature = "web")]
pub mod app;

pub use config::PortalConfig;
pub use error::{PortalError, Result};
pub use export::{build_document, build_workbook, export_xlsx, render_document_html};
pub use format::DateOrder;
pub use import::{ImportReport, import_xlsx, reconcile};
pub use logframe::{ActivityDraft, BudgetDraft, DeleteReport, KpiDraft, Logframe};
pub use model::{
    Activity, ActivityStatus, BudgetLine, Goal, Kpi, NodeKind, NodeRef, Outcome, Output,
    ProjectInfo,
};
pub use numbering::{Numbering, compute_numbers};
pub use portfolio::PortfolioStore;
pub use workbook::{CellValue, Sheet, Workbook};
