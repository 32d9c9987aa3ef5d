//! Import Reconciler.
//!
//! Rebuilds a [`Logframe`] from a previously exported workbook. Exports
//! carry names rather than identifiers, so every link (outcome → goal,
//! output → outcome, KPI → output, activity → KPI, budget → output) is
//! re-established by matching text against the items read so far.
//!
//! The new store is built on the side and swapped in only when the whole
//! workbook was read; a failed import leaves the caller's state untouched.
//! Rows whose parent cannot be resolved are dropped and counted, never
//! reported as errors. When a name matches several candidates the first one
//! is taken and the match is recorded in [`ImportReport::ambiguous`].

use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{PortalError, Result};
use crate::export::{
    BUDGET_SHEET, FIELD_CONTACT_EMAIL, FIELD_CONTACT_NAME, FIELD_CONTACT_PHONE, FIELD_END,
    FIELD_INSTITUTION, FIELD_PI_EMAIL, FIELD_PI_NAME, FIELD_START, FIELD_TITLE,
    IDENTIFICATION_SHEET, KPI_SHEET, SUMMARY_SHEET, WORKPLAN_SHEET,
};
use crate::format::{DateOrder, parse_date_like, parse_flag, strip_label_prefix};
use crate::ids::generate_id;
use crate::logframe::Logframe;
use crate::model::{
    Activity, ActivityStatus, BudgetLine, Goal, Kpi, NodeKind, Outcome, Output, ProjectInfo,
};
use crate::workbook::{Record, Table, Workbook};

/// A name that matched more than one candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AmbiguousMatch {
    pub sheet: String,
    pub row: usize,
    pub name: String,
    pub candidates: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub goals: usize,
    pub outcomes: usize,
    pub outputs: usize,
    pub kpis: usize,
    pub activities: usize,
    pub budget_lines: usize,
    pub dropped_kpis: usize,
    pub dropped_activities: usize,
    pub dropped_budget_lines: usize,
    /// Goals beyond the first, discarded by the single-goal rule.
    pub discarded_goals: usize,
    /// Outcomes beyond the first, discarded by the single-outcome rule.
    pub discarded_outcomes: usize,
    pub identification_imported: bool,
    pub ambiguous: Vec<AmbiguousMatch>,
}

enum Resolution {
    Unique(String),
    Ambiguous(String, usize),
    Missing,
}

/// Normalised name -> ids in read order.
#[derive(Default)]
struct NameIndex {
    by_name: HashMap<String, Vec<String>>,
}

impl NameIndex {
    fn key(name: &str) -> String {
        name.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn insert(&mut self, name: &str, id: &str) {
        self.by_name
            .entry(Self::key(name))
            .or_default()
            .push(id.to_string());
    }

    fn resolve(&self, name: &str) -> Resolution {
        if name.trim().is_empty() {
            return Resolution::Missing;
        }
        match self.by_name.get(&Self::key(name)).map(Vec::as_slice) {
            Some([only]) => Resolution::Unique(only.clone()),
            Some([first, ..]) => Resolution::Ambiguous(first.clone(), self.count(name)),
            _ => Resolution::Missing,
        }
    }

    fn count(&self, name: &str) -> usize {
        self.by_name.get(&Self::key(name)).map_or(0, Vec::len)
    }
}

/// Working state of one reconciliation.
struct Reconciler<'a> {
    book: &'a Workbook,
    order: DateOrder,
    store: Logframe,
    report: ImportReport,
    goal_names: NameIndex,
    outcome_names: NameIndex,
    output_names: NameIndex,
}

impl<'a> Reconciler<'a> {
    fn new(book: &'a Workbook, order: DateOrder, project: ProjectInfo) -> Self {
        Reconciler {
            book,
            order,
            store: Logframe {
                project,
                ..Logframe::default()
            },
            report: ImportReport::default(),
            goal_names: NameIndex::default(),
            outcome_names: NameIndex::default(),
            output_names: NameIndex::default(),
        }
    }

    fn pick(&mut self, resolution: Resolution, sheet: &str, row: usize, name: &str) -> Option<String> {
        match resolution {
            Resolution::Unique(id) => Some(id),
            Resolution::Ambiguous(id, candidates) => {
                warn!(
                    "{} row {}: '{}' matches {} items, using the first",
                    sheet, row, name, candidates
                );
                self.report.ambiguous.push(AmbiguousMatch {
                    sheet: sheet.to_string(),
                    row,
                    name: name.to_string(),
                    candidates,
                });
                Some(id)
            }
            Resolution::Missing => None,
        }
    }

    fn read_summary(&mut self) {
        let book = self.book;
        let Some(sheet) = book.sheet(SUMMARY_SHEET) else {
            return;
        };
        let table = sheet.table();

        let mut outcome_parents: Vec<(usize, String, usize)> = Vec::new();
        let mut output_parents: Vec<(usize, String, usize)> = Vec::new();

        for record in table.records() {
            let Some(kind) = NodeKind::from_label(&record.text(&["Level"])) else {
                continue;
            };
            let name = strip_label_prefix(&record.text(&["Text / Title", "Name", "Title"]), kind);
            if name.is_empty() {
                continue;
            }
            let parent = record.text(&["Parent ID", "Parent"]);
            let id = generate_id();
            match kind {
                NodeKind::Goal => {
                    self.goal_names.insert(&name, &id);
                    self.store.goals.push(Goal { id, name });
                }
                NodeKind::Outcome => {
                    self.outcome_names.insert(&name, &id);
                    outcome_parents.push((self.store.outcomes.len(), parent, record.row));
                    self.store.outcomes.push(Outcome {
                        id,
                        name,
                        parent_id: None,
                    });
                }
                NodeKind::Output => {
                    self.output_names.insert(&name, &id);
                    output_parents.push((self.store.outputs.len(), parent, record.row));
                    self.store.outputs.push(Output {
                        id,
                        name,
                        assumptions: record.text(&["Assumptions", "Key Assumptions"]),
                        parent_id: None,
                    });
                }
                NodeKind::Kpi | NodeKind::Activity => {}
            }
        }

        for (idx, raw, row) in outcome_parents {
            let resolved = match self.goal_names.resolve(&raw) {
                Resolution::Missing if self.store.goals.len() == 1 => {
                    Some(self.store.goals[0].id.clone())
                }
                resolution => self.pick(resolution, SUMMARY_SHEET, row, &raw),
            };
            self.store.outcomes[idx].parent_id = resolved;
        }
        for (idx, raw, row) in output_parents {
            let resolved = match self.outcome_names.resolve(&raw) {
                Resolution::Missing if self.store.outcomes.len() == 1 => {
                    Some(self.store.outcomes[0].id.clone())
                }
                resolution => self.pick(resolution, SUMMARY_SHEET, row, &raw),
            };
            self.store.outputs[idx].parent_id = resolved;
        }
    }

    fn read_kpis(&mut self) {
        let book = self.book;
        let Some(sheet) = book.sheet(KPI_SHEET) else {
            return;
        };
        let table = sheet.table();

        for record in table.records() {
            let label = record.text(&["Parent (label)", "Parent"]);
            let Some(parent_id) = self.resolve_output_label(&label, record.row) else {
                self.report.dropped_kpis += 1;
                continue;
            };
            let name = strip_label_prefix(&record.text(&["KPI", "Indicator"]), NodeKind::Kpi);
            if name.is_empty() {
                self.report.dropped_kpis += 1;
                continue;
            }
            self.store.kpis.push(Kpi {
                id: generate_id(),
                name,
                parent_id: Some(parent_id),
                baseline: record.text(&["Baseline"]),
                target: record.text(&["Target"]),
                start_date: parse_date_like(record.get(&["Start Date", "Start"]), self.order),
                end_date: parse_date_like(record.get(&["End Date", "End"]), self.order),
                linked_payment: parse_flag(record.get(&["Linked to Payment"])),
                mov: record.text(&["Means of Verification", "MoV"]),
            });
        }
    }

    /// `"Output 2 — Title"`: the part after the dash first, then the whole label.
    fn resolve_output_label(&mut self, label: &str, row: usize) -> Option<String> {
        let label = label.trim();
        if let Some((_, title)) = label.split_once('—') {
            let title = title.trim();
            let resolution = self.output_names.resolve(title);
            if !matches!(resolution, Resolution::Missing) {
                return self.pick(resolution, KPI_SHEET, row, title);
            }
        }
        let stripped = strip_label_prefix(label, NodeKind::Output);
        let resolution = self.output_names.resolve(&stripped);
        if !matches!(resolution, Resolution::Missing) {
            return self.pick(resolution, KPI_SHEET, row, &stripped);
        }
        let resolution = self.output_names.resolve(label);
        self.pick(resolution, KPI_SHEET, row, label)
    }

    fn sole_output(&self) -> Option<String> {
        match self.store.outputs.as_slice() {
            [only] => Some(only.id.clone()),
            _ => None,
        }
    }

    // Accepts both the full export layout and the short five-column one.
    fn read_workplan(&mut self) -> Result<()> {
        let book = self.book;
        let Some(sheet) = book.sheet(WORKPLAN_SHEET) else {
            return Ok(());
        };
        let table = sheet.table();
        let rich = table.has_column("Activity ID")
            || table.has_column("Linked KPIs")
            || table.has_column("% complete");

        // Exported activity id -> fresh id, for dependency links.
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut raw_dependencies: Vec<(usize, String)> = Vec::new();

        for record in table.records() {
            let name = strip_label_prefix(&record.text(&["Activity", "Activity Name"]), NodeKind::Activity);
            if name.is_empty() {
                self.report.dropped_activities += 1;
                continue;
            }
            let activity = if rich {
                let (activity, deps) = self.rich_activity(&table, &record, name)?;
                let old_id = record.text(&["Activity ID"]);
                if !old_id.is_empty() {
                    id_map.insert(old_id, activity.id.clone());
                }
                raw_dependencies.push((self.store.activities.len(), deps));
                activity
            } else {
                self.simple_activity(&record, name)
            };
            self.store.activities.push(activity);
        }

        for (idx, deps) in raw_dependencies {
            self.store.activities[idx].dependencies = split_list(&deps, ',')
                .iter()
                .filter_map(|d| id_map.get(d).cloned())
                .collect();
        }
        Ok(())
    }

    fn rich_activity(
        &mut self,
        table: &Table<'_>,
        record: &Record<'_>,
        name: String,
    ) -> Result<(Activity, String)> {
        let output_name = record.text(&["Output"]);
        let output_id = match self.output_names.resolve(&output_name) {
            Resolution::Missing => self.sole_output(),
            resolution => self.pick(resolution, WORKPLAN_SHEET, record.row, &output_name),
        };

        let mut kpi_ids = Vec::new();
        for kpi_name in self.linked_kpi_names(&record.text(&["Linked KPIs"])) {
            let key = NameIndex::key(&kpi_name);
            let matches: Vec<(String, bool)> = self
                .store
                .kpis
                .iter()
                .filter(|k| NameIndex::key(&k.name) == key)
                .map(|k| (k.id.clone(), k.parent_id.is_some() && k.parent_id == output_id))
                .collect();
            // Prefer KPIs under the activity's own output.
            let preferred: Vec<String> = matches
                .iter()
                .filter(|(_, own)| *own)
                .map(|(id, _)| id.clone())
                .collect();
            let pool = if preferred.is_empty() {
                matches.into_iter().map(|(id, _)| id).collect()
            } else {
                preferred
            };
            let chosen = match pool.len() {
                0 => None,
                1 => pool.into_iter().next(),
                n => {
                    let resolution = Resolution::Ambiguous(pool[0].clone(), n);
                    self.pick(resolution, WORKPLAN_SHEET, record.row, &kpi_name)
                }
            };
            if let Some(id) = chosen {
                if !kpi_ids.contains(&id) {
                    kpi_ids.push(id);
                }
            }
        }

        let progress = match record.get(&["% complete", "Progress"]) {
            value if value.is_empty() => 0.0,
            value => value.as_f64().ok_or_else(|| {
                PortalError::import(
                    table.sheet_name(),
                    record.cell_ref(&["% complete", "Progress"]),
                    format!("'{}' is not a percentage", value.as_text()),
                )
            })?,
        };

        let activity = Activity {
            id: generate_id(),
            output_id,
            name,
            owner: record.text(&["Owner", "Responsible Person"]),
            start_date: parse_date_like(record.get(&["Start", "Start Date"]), self.order),
            end_date: parse_date_like(record.get(&["End", "End Date"]), self.order),
            status: ActivityStatus::parse(&record.text(&["Status"])).unwrap_or_default(),
            progress: progress.round().clamp(0.0, 100.0) as u8,
            kpi_ids,
            milestones: split_list(&record.text(&["Milestones", "Milestone"]), '|'),
            dependencies: Vec::new(),
            notes: record.text(&["Notes"]),
        };
        Ok((activity, record.text(&["Dependencies"])))
    }

    /// Split a "Linked KPIs" cell on commas, keeping commas that belong to a
    /// KPI name. At each position the longest run of pieces naming a known
    /// KPI wins; a piece matching nothing stands on its own.
    fn linked_kpi_names(&self, cell: &str) -> Vec<String> {
        let known: HashSet<String> = self
            .store
            .kpis
            .iter()
            .map(|k| NameIndex::key(&k.name))
            .collect();
        let pieces: Vec<&str> = cell.split(',').collect();
        let mut names = Vec::new();

        let mut i = 0;
        while i < pieces.len() {
            let mut end = i + 1;
            for j in (i + 2..=pieces.len()).rev() {
                let joined = strip_label_prefix(&pieces[i..j].join(","), NodeKind::Kpi);
                if known.contains(&NameIndex::key(&joined)) {
                    end = j;
                    break;
                }
            }
            let name = strip_label_prefix(&pieces[i..end].join(","), NodeKind::Kpi);
            if !name.is_empty() {
                names.push(name);
            }
            i = end;
        }
        names
    }

    fn simple_activity(&self, record: &Record<'_>, name: String) -> Activity {
        Activity {
            id: generate_id(),
            output_id: self.sole_output(),
            name,
            owner: record.text(&["Owner", "Responsible Person"]),
            start_date: parse_date_like(record.get(&["Start Date", "Start"]), self.order),
            end_date: parse_date_like(record.get(&["End Date", "End"]), self.order),
            status: ActivityStatus::Planned,
            progress: 0,
            kpi_ids: Vec::new(),
            milestones: split_list(&record.text(&["Milestone", "Milestones"]), '|'),
            dependencies: Vec::new(),
            notes: String::new(),
        }
    }

    fn read_budget(&mut self) -> Result<()> {
        let book = self.book;
        let Some(sheet) = book.sheet(BUDGET_SHEET) else {
            return Ok(());
        };
        let table = sheet.table();

        for record in table.records() {
            let output_name = record.text(&["Output"]);
            let output_id = match self.output_names.resolve(&output_name) {
                Resolution::Missing => {
                    let literal = record.text(&["OutputID", "Output ID"]);
                    self.store.output(&literal).map(|o| o.id.clone())
                }
                resolution => self.pick(resolution, BUDGET_SHEET, record.row, &output_name),
            };
            let item = record.text(&["Item", "Line Item"]);
            if output_id.is_none() && item.is_empty() {
                self.report.dropped_budget_lines += 1;
                continue;
            }

            let quantity = number(&table, &record, &["Qty", "Quantity"])?;
            let unit_cost = number(&table, &record, &["Unit Cost"])?;
            let mut line = BudgetLine {
                id: generate_id(),
                output_id,
                item,
                category: record.text(&["Category"]),
                unit: record.text(&["Unit"]),
                quantity,
                unit_cost,
                currency: record.text(&["Currency"]),
                total: 0.0,
            };
            line.recompute_total();
            self.store.budget.push(line);
        }
        Ok(())
    }

    // One Goal, one Outcome.
    fn enforce_cardinality(&mut self) {
        if self.store.goals.len() > 1 {
            let discarded: Vec<String> = self.store.goals.drain(1..).map(|g| g.id).collect();
            self.report.discarded_goals = discarded.len();
            for outcome in &mut self.store.outcomes {
                if outcome
                    .parent_id
                    .as_ref()
                    .is_some_and(|p| discarded.contains(p))
                {
                    outcome.parent_id = None;
                }
            }
        }
        if self.store.outcomes.len() > 1 {
            self.report.discarded_outcomes = self.store.outcomes.len() - 1;
            self.store.outcomes.truncate(1);
            let keep = self.store.outcomes[0].id.clone();
            for output in &mut self.store.outputs {
                output.parent_id = Some(keep.clone());
            }
        }
    }

    fn read_identification(&mut self) {
        let book = self.book;
        let Some(sheet) = book.sheet(IDENTIFICATION_SHEET) else {
            return;
        };
        let table = sheet.table();
        let mut info = ProjectInfo::default();

        for record in table.records() {
            let field = record.text(&["Field"]).to_lowercase();
            let value = record.get(&["Value"]);
            let matches = |label: &str| field == label.to_lowercase();
            if matches(FIELD_TITLE) {
                info.title = value.as_text();
            } else if matches(FIELD_PI_NAME) {
                info.pi_name = value.as_text();
            } else if matches(FIELD_PI_EMAIL) {
                info.pi_email = value.as_text();
            } else if matches(FIELD_INSTITUTION) {
                info.institution = value.as_text();
            } else if matches(FIELD_START) {
                info.start_date = parse_date_like(value, self.order);
            } else if matches(FIELD_END) {
                info.end_date = parse_date_like(value, self.order);
            } else if matches(FIELD_CONTACT_NAME) {
                info.contact_name = value.as_text();
            } else if matches(FIELD_CONTACT_EMAIL) {
                info.contact_email = value.as_text();
            } else if matches(FIELD_CONTACT_PHONE) {
                info.contact_phone = value.as_text();
            }
        }

        self.store.project = info;
        self.report.identification_imported = true;
    }

    fn run(mut self) -> Result<(Logframe, ImportReport)> {
        self.read_summary();
        self.read_kpis();
        self.read_workplan()?;
        self.read_budget()?;
        self.enforce_cardinality();
        self.read_identification();

        let store = self.store;
        let mut report = self.report;
        report.goals = store.goals.len();
        report.outcomes = store.outcomes.len();
        report.outputs = store.outputs.len();
        report.kpis = store.kpis.len();
        report.activities = store.activities.len();
        report.budget_lines = store.budget.len();
        Ok((store, report))
    }
}

fn number(table: &Table<'_>, record: &Record<'_>, names: &[&str]) -> Result<f64> {
    let value = record.get(names);
    if value.is_empty() {
        return Ok(0.0);
    }
    value.as_f64().ok_or_else(|| {
        PortalError::import(
            table.sheet_name(),
            record.cell_ref(names),
            format!("'{}' is not a number", value.as_text()),
        )
    })
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rebuild `logframe` from an exported workbook.
///
/// On error `logframe` is left exactly as it was. The Identification record
/// is replaced only when the workbook has an Identification sheet.
pub fn reconcile(book: &Workbook, logframe: &mut Logframe, order: DateOrder) -> Result<ImportReport> {
    let reconciler = Reconciler::new(book, order, logframe.project.clone());
    let (store, report) = reconciler.run()?;

    info!(
        "imported {} goal(s), {} outcome(s), {} output(s), {} KPI(s), {} activities, {} budget line(s); dropped {} KPI(s), {} activities, {} budget line(s)",
        report.goals,
        report.outcomes,
        report.outputs,
        report.kpis,
        report.activities,
        report.budget_lines,
        report.dropped_kpis,
        report.dropped_activities,
        report.dropped_budget_lines
    );
    if !report.ambiguous.is_empty() {
        warn!("{} ambiguous name match(es) during import", report.ambiguous.len());
    }

    *logframe = store;
    Ok(report)
}

/// Read XLSX bytes and reconcile them into `logframe`.
pub fn import_xlsx(bytes: &[u8], logframe: &mut Logframe, order: DateOrder) -> Result<ImportReport> {
    let book = crate::loader::from_xlsx_bytes(bytes)?;
    reconcile(&book, logframe, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{CellValue, Sheet};

    #[test]
    fn name_index_normalises_whitespace_and_case() {
        let mut index = NameIndex::default();
        index.insert("Trained  Staff", "a");
        index.insert("other", "b");
        assert!(matches!(index.resolve(" trained staff "), Resolution::Unique(id) if id == "a"));
        index.insert("TRAINED STAFF", "c");
        assert!(matches!(index.resolve("trained staff"), Resolution::Ambiguous(id, 2) if id == "a"));
        assert!(matches!(index.resolve(""), Resolution::Missing));
    }

    #[test]
    fn lists_split_and_trim() {
        assert_eq!(split_list(" a | b ||c", '|'), vec!["a", "b", "c"]);
        assert!(split_list("", ',').is_empty());
    }

    #[test]
    fn blank_numbers_are_zero() {
        let mut sheet = Sheet::new("Budget", &["Qty", "Unit Cost"]);
        sheet.push_row(vec![CellValue::Empty, "abc".into()]);
        let table = sheet.table();
        let record = table.records().next().unwrap();
        assert_eq!(number(&table, &record, &["Qty"]).unwrap(), 0.0);

        let err = number(&table, &record, &["Unit Cost"]).unwrap_err();
        assert!(err.to_string().contains("B2"));
    }
}
