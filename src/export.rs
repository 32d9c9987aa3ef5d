//! Export Builder.
//!
//! The whole export is assembled in memory (a [`Workbook`] or a
//! [`LogframeDocument`]) and only then handed to a writer, so a failing
//! writer never leaves half a file behind.

use serde::Serialize;

use crate::error::Result;
use crate::format::{fmt_amount, fmt_opt_date};
use crate::logframe::Logframe;
use crate::model::NodeKind;
use crate::numbering::{compute_numbers, display_label};
use crate::workbook::{CellValue, Sheet, Workbook};

pub const IDENTIFICATION_SHEET: &str = "Identification";
pub const SUMMARY_SHEET: &str = "Summary";
pub const KPI_SHEET: &str = "KPI Matrix";
pub const WORKPLAN_SHEET: &str = "Workplan";
pub const BUDGET_SHEET: &str = "Budget";

pub const SUMMARY_COLUMNS: [&str; 4] = ["Level", "Text / Title", "Parent ID", "Assumptions"];
pub const KPI_COLUMNS: [&str; 9] = [
    "Parent Level",
    "Parent (label)",
    "KPI",
    "Baseline",
    "Target",
    "Start Date",
    "End Date",
    "Linked to Payment",
    "Means of Verification",
];
pub const WORKPLAN_COLUMNS: [&str; 13] = [
    "Activity ID",
    "Activity #",
    "Output",
    "Activity",
    "Owner",
    "Start",
    "End",
    "Status",
    "% complete",
    "Linked KPIs",
    "Milestones",
    "Notes",
    "Dependencies",
];
pub const BUDGET_COLUMNS: [&str; 9] = [
    "OutputID",
    "Output",
    "Item",
    "Category",
    "Unit",
    "Qty",
    "Unit Cost",
    "Currency",
    "Total",
];

/// Identification field labels, in export order.
pub const FIELD_TITLE: &str = "Project title";
pub const FIELD_PI_NAME: &str = "PI / Manager name";
pub const FIELD_PI_EMAIL: &str = "PI / Manager email";
pub const FIELD_INSTITUTION: &str = "Institution";
pub const FIELD_START: &str = "Start date";
pub const FIELD_END: &str = "End date";
pub const FIELD_CONTACT_NAME: &str = "Contact name";
pub const FIELD_CONTACT_EMAIL: &str = "Contact email";
pub const FIELD_CONTACT_PHONE: &str = "Contact phone";
pub const FIELD_FUNDING: &str = "Total funding requested";
pub const FIELD_OUTPUTS: &str = "Number of outputs";
pub const FIELD_KPIS: &str = "Number of KPIs";

pub const MILESTONE_SEPARATOR: &str = " | ";
pub const LIST_SEPARATOR: &str = ", ";

fn text(value: &str) -> CellValue {
    CellValue::from(value)
}

fn date_cell(date: Option<chrono::NaiveDate>) -> CellValue {
    CellValue::Text(fmt_opt_date(date))
}

pub fn build_workbook(logframe: &Logframe) -> Workbook {
    let mut book = Workbook::new();
    book.add_sheet(identification_sheet(logframe));
    book.add_sheet(summary_sheet(logframe));
    book.add_sheet(kpi_sheet(logframe));
    book.add_sheet(workplan_sheet(logframe));
    book.add_sheet(budget_sheet(logframe));
    book
}

fn identification_sheet(logframe: &Logframe) -> Sheet {
    let info = &logframe.project;
    let mut sheet = Sheet::new(IDENTIFICATION_SHEET, &["Field", "Value"]);
    let rows = [
        (FIELD_TITLE, info.title.clone()),
        (FIELD_PI_NAME, info.pi_name.clone()),
        (FIELD_PI_EMAIL, info.pi_email.clone()),
        (FIELD_INSTITUTION, info.institution.clone()),
        (FIELD_START, fmt_opt_date(info.start_date)),
        (FIELD_END, fmt_opt_date(info.end_date)),
        (FIELD_CONTACT_NAME, info.contact_name.clone()),
        (FIELD_CONTACT_EMAIL, info.contact_email.clone()),
        (FIELD_CONTACT_PHONE, info.contact_phone.clone()),
        (FIELD_FUNDING, fmt_amount(logframe.funding_total())),
        (FIELD_OUTPUTS, logframe.outputs.len().to_string()),
        (FIELD_KPIS, logframe.kpis.len().to_string()),
    ];
    for (field, value) in rows {
        sheet.push_row(vec![text(field), CellValue::Text(value)]);
    }
    sheet
}

// "Parent ID" holds the parent's title: ids are regenerated on import, so
// the reconciler can only match by name.
fn summary_sheet(logframe: &Logframe) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_SHEET, &SUMMARY_COLUMNS);
    for goal in &logframe.goals {
        sheet.push_row(vec![
            text(NodeKind::Goal.label()),
            text(&goal.name),
            CellValue::Empty,
            CellValue::Empty,
        ]);
    }
    for outcome in &logframe.outcomes {
        let parent = outcome
            .parent_id
            .as_deref()
            .and_then(|id| logframe.goal(id))
            .map(|g| g.name.as_str())
            .unwrap_or_default();
        sheet.push_row(vec![
            text(NodeKind::Outcome.label()),
            text(&outcome.name),
            text(parent),
            CellValue::Empty,
        ]);
    }
    for output in &logframe.outputs {
        let parent = output
            .parent_id
            .as_deref()
            .and_then(|id| logframe.outcome(id))
            .map(|o| o.name.as_str())
            .unwrap_or_default();
        sheet.push_row(vec![
            text(NodeKind::Output.label()),
            text(&output.name),
            text(parent),
            text(&output.assumptions),
        ]);
    }
    sheet
}

fn kpi_sheet(logframe: &Logframe) -> Sheet {
    let numbering = compute_numbers(logframe, false);
    let mut sheet = Sheet::new(KPI_SHEET, &KPI_COLUMNS);
    for output in &logframe.outputs {
        let parent_label = display_label(NodeKind::Output, numbering.output(&output.id), &output.name);
        for kpi in logframe.kpis_of(&output.id) {
            sheet.push_row(vec![
                text(NodeKind::Output.label()),
                text(&parent_label),
                text(&kpi.name),
                text(&kpi.baseline),
                text(&kpi.target),
                date_cell(kpi.start_date),
                date_cell(kpi.end_date),
                text(if kpi.linked_payment { "Yes" } else { "No" }),
                text(&kpi.mov),
            ]);
        }
    }
    sheet
}

fn workplan_sheet(logframe: &Logframe) -> Sheet {
    let numbering = compute_numbers(logframe, true);
    let mut sheet = Sheet::new(WORKPLAN_SHEET, &WORKPLAN_COLUMNS);
    for activity in &logframe.activities {
        let output_name = activity
            .output_id
            .as_deref()
            .and_then(|id| logframe.output(id))
            .map(|o| o.name.as_str())
            .unwrap_or_default();
        let kpi_names: Vec<&str> = activity
            .kpi_ids
            .iter()
            .filter_map(|id| logframe.kpi(id))
            .map(|k| k.name.as_str())
            .collect();
        sheet.push_row(vec![
            text(&activity.id),
            text(numbering.activity(&activity.id).unwrap_or_default()),
            text(output_name),
            text(&activity.name),
            text(&activity.owner),
            date_cell(activity.start_date),
            date_cell(activity.end_date),
            text(activity.status.as_str()),
            CellValue::Number(activity.progress as f64),
            text(&kpi_names.join(LIST_SEPARATOR)),
            text(&activity.milestones.join(MILESTONE_SEPARATOR)),
            text(&activity.notes),
            text(&activity.dependencies.join(LIST_SEPARATOR)),
        ]);
    }
    sheet
}

fn budget_sheet(logframe: &Logframe) -> Sheet {
    let mut sheet = Sheet::new(BUDGET_SHEET, &BUDGET_COLUMNS).with_number_format("0.00");
    for line in &logframe.budget {
        let output_name = line
            .output_id
            .as_deref()
            .and_then(|id| logframe.output(id))
            .map(|o| o.name.as_str())
            .unwrap_or_default();
        sheet.push_row(vec![
            text(line.output_id.as_deref().unwrap_or_default()),
            text(output_name),
            text(&line.item),
            text(&line.category),
            text(&line.unit),
            CellValue::Number(line.quantity),
            CellValue::Number(line.unit_cost),
            text(&line.currency),
            CellValue::Number(line.total),
        ]);
    }
    sheet
}

/// Spreadsheet export of the whole logframe, workplan and budget.
pub fn export_xlsx(logframe: &Logframe) -> Result<Vec<u8>> {
    crate::downloader::to_xlsx(&build_workbook(logframe))
}

// ---------------------------------------------------------------------------
// Structured document
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LogframeDocument {
    pub title: String,
    pub goal: String,
    pub outcome: String,
    pub groups: Vec<OutputGroup>,
}

/// One Output block; its label and assumptions cells span all KPI rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OutputGroup {
    pub output: String,
    pub assumptions: String,
    pub rows: Vec<KpiRow>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KpiRow {
    pub kpi: String,
    pub mov: String,
}

impl OutputGroup {
    /// Height of the merged Output/Assumptions cells.
    pub fn rowspan(&self) -> usize {
        self.rows.len().max(1)
    }
}

pub fn build_document(logframe: &Logframe) -> LogframeDocument {
    let numbering = compute_numbers(logframe, false);

    let mut groups = Vec::new();
    for outcome in &logframe.outcomes {
        for output in logframe.outputs_of(&outcome.id) {
            let number = numbering.output(&output.id);
            let rows = logframe
                .kpis_of(&output.id)
                .map(|kpi| KpiRow {
                    kpi: display_label(NodeKind::Kpi, numbering.kpi(&kpi.id), &kpi.name),
                    mov: kpi.mov.clone(),
                })
                .collect();
            groups.push(OutputGroup {
                output: display_label(NodeKind::Output, number, &output.name),
                assumptions: output.assumptions.clone(),
                rows,
            });
        }
    }

    LogframeDocument {
        title: logframe.project.title.clone(),
        goal: logframe
            .goals
            .first()
            .map(|g| g.name.clone())
            .unwrap_or_default(),
        outcome: logframe
            .outcomes
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_default(),
        groups,
    }
}

#[cfg(feature = "docs")]
const DOCUMENT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{#if title}}{{title}}{{else}}Logframe{{/if}}</title>
<style>
  body { font-family: Calibri, Arial, sans-serif; }
  .banner { border: 1px solid #1f3864; margin-bottom: 8px; }
  .banner h2 { background: #1f3864; color: #fff; margin: 0; padding: 4px 8px; font-size: 13pt; }
  .banner p { margin: 0; padding: 6px 8px; }
  table { border-collapse: collapse; width: 100%; }
  th, td { border: 1px solid #555; padding: 4px 6px; vertical-align: top; }
  th { background: #d9e2f3; }
</style>
</head>
<body>
{{#if title}}<h1>{{title}}</h1>{{/if}}
<div class="banner"><h2>GOAL</h2><p>{{goal}}</p></div>
<div class="banner"><h2>OUTCOME</h2><p>{{outcome}}</p></div>
<table>
<tr><th>Output</th><th>KPI</th><th>Means of Verification</th><th>Key Assumptions</th></tr>
{{#each groups}}
{{#if rows}}
{{#each rows}}
<tr>
{{#if @first}}<td rowspan="{{../rowspan}}">{{../output}}</td>{{/if}}
<td>{{kpi}}</td><td>{{mov}}</td>
{{#if @first}}<td rowspan="{{../rowspan}}">{{../assumptions}}</td>{{/if}}
</tr>
{{/each}}
{{else}}
<tr><td>{{output}}</td><td></td><td></td><td>{{assumptions}}</td></tr>
{{/if}}
{{/each}}
</table>
</body>
</html>
"#;

#[cfg(feature = "docs")]
#[derive(Serialize)]
struct TemplateGroup<'a> {
    output: &'a str,
    assumptions: &'a str,
    rowspan: usize,
    rows: &'a [KpiRow],
}

#[cfg(feature = "docs")]
#[derive(Serialize)]
struct TemplateData<'a> {
    title: &'a str,
    goal: &'a str,
    outcome: &'a str,
    groups: Vec<TemplateGroup<'a>>,
}

/// Render the document export as HTML with merged Output/Assumptions cells.
#[cfg(feature = "docs")]
pub fn render_document_html(document: &LogframeDocument) -> Result<String> {
    use crate::error::PortalError;
    use handlebars::Handlebars;

    let mut registry = Handlebars::new();
    registry
        .register_template_string("logframe", DOCUMENT_TEMPLATE)
        .map_err(|e| PortalError::Template(e.to_string()))?;

    let data = TemplateData {
        title: &document.title,
        goal: &document.goal,
        outcome: &document.outcome,
        groups: document
            .groups
            .iter()
            .map(|g| TemplateGroup {
                output: &g.output,
                assumptions: &g.assumptions,
                rowspan: g.rowspan(),
                rows: &g.rows,
            })
            .collect(),
    };

    registry
        .render("logframe", &data)
        .map_err(|e| PortalError::Template(e.to_string()))
}

#[cfg(not(feature = "docs"))]
pub fn render_document_html(_document: &LogframeDocument) -> Result<String> {
    Err(crate::error::PortalError::MissingDependency {
        feature: "docs",
        package: "handlebars",
    })
}
