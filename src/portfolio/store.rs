use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    DEFAULT_OVERHEAD_RATE, Direction, FrameworkLevel, FrameworkNode, Indicator, IndicatorActual,
    IndicatorMapping, IndicatorTarget, PeriodStatus, PlannedBudgetLine, PortfolioActivity,
    Project, ProjectStatus, QaStatus, ReportingPeriod, RowId, StrategicIndicator,
};
use crate::error::{PortalError, Result};

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

fn default_overhead() -> f64 {
    DEFAULT_OVERHEAD_RATE
}

/// Submitted project form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub status: ProjectStatus,
    pub manager_user: String,
    pub funder: String,
    #[serde(default = "default_overhead")]
    pub overhead_rate: f64,
    #[serde(default)]
    pub notes: String,
}

impl From<&Project> for ProjectInput {
    fn from(project: &Project) -> Self {
        ProjectInput {
            title: project.title.clone(),
            description: project.description.clone(),
            start_date: project.start_date,
            end_date: project.end_date,
            status: project.status,
            manager_user: project.manager_user.clone(),
            funder: project.funder.clone(),
            overhead_rate: project.overhead_rate,
            notes: project.notes.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameworkNodeInput {
    pub project_id: RowId,
    pub level: FrameworkLevel,
    #[serde(default)]
    pub parent_node_id: Option<RowId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "first_position")]
    pub sort_order: i32,
}

fn first_position() -> i32 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorInput {
    pub project_id: RowId,
    pub framework_node_id: RowId,
    pub name: String,
    pub unit: String,
    pub direction: Direction,
    #[serde(default)]
    pub requires_disaggregation: bool,
    #[serde(default)]
    pub tags: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityInput {
    pub project_id: RowId,
    pub framework_node_id: RowId,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub status: ProjectStatus,
    pub owner_user: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetLineInput {
    pub project_id: RowId,
    pub activity_id: RowId,
    pub fiscal_year: String,
    pub planned_amount: f64,
    #[serde(default)]
    pub actual_amount: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategicIndicatorInput {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub direction: Direction,
}

/// All portfolio tables.
///
/// Identifiers come from one counter shared by every table and are never
/// reused, even after deletes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStore {
    next_id: RowId,
    pub projects: BTreeMap<RowId, Project>,
    pub framework_nodes: BTreeMap<RowId, FrameworkNode>,
    pub indicators: BTreeMap<RowId, Indicator>,
    pub periods: BTreeMap<RowId, ReportingPeriod>,
    pub targets: BTreeMap<RowId, IndicatorTarget>,
    pub actuals: BTreeMap<RowId, IndicatorActual>,
    pub activities: BTreeMap<RowId, PortfolioActivity>,
    pub budget_lines: BTreeMap<RowId, PlannedBudgetLine>,
    pub strategic_indicators: BTreeMap<RowId, StrategicIndicator>,
    pub mappings: BTreeMap<RowId, IndicatorMapping>,
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PortalError::validation(field, "is required"));
    }
    Ok(value.to_string())
}

fn ordered(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(PortalError::validation(
            "start_date",
            "Start must be on/before End",
        ));
    }
    Ok(())
}

fn amount(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(PortalError::validation(field, "must be a number >= 0"));
    }
    Ok(value)
}

/// Check a project form and return it trimmed.
pub fn validate_project(input: &ProjectInput) -> Result<ProjectInput> {
    let title = required("title", &input.title)?;
    let funder = required("funder", &input.funder)?;
    let manager = input.manager_user.trim();
    if !EMAIL_REGEX.is_match(manager) {
        return Err(PortalError::validation(
            "manager_user",
            "Valid manager email required",
        ));
    }
    ordered(input.start_date, input.end_date)?;
    if !input.overhead_rate.is_finite() || !(0.0..=1.0).contains(&input.overhead_rate) {
        return Err(PortalError::validation(
            "overhead_rate",
            "must be between 0 and 1",
        ));
    }
    Ok(ProjectInput {
        title,
        funder,
        manager_user: manager.to_string(),
        description: input.description.trim().to_string(),
        notes: input.notes.trim().to_string(),
        ..input.clone()
    })
}

impl PortfolioStore {
    pub fn new() -> Self {
        PortfolioStore::default()
    }

    fn allocate(&mut self) -> RowId {
        self.next_id += 1;
        self.next_id
    }

    pub fn project(&self, id: RowId) -> Result<&Project> {
        self.projects
            .get(&id)
            .ok_or_else(|| PortalError::not_found("Project", id.to_string()))
    }

    pub fn period(&self, id: RowId) -> Result<&ReportingPeriod> {
        self.periods
            .get(&id)
            .ok_or_else(|| PortalError::not_found("Reporting period", id.to_string()))
    }

    pub fn indicator(&self, id: RowId) -> Result<&Indicator> {
        self.indicators
            .get(&id)
            .ok_or_else(|| PortalError::not_found("Indicator", id.to_string()))
    }

    pub fn periods_of(&self, project_id: RowId) -> impl Iterator<Item = &ReportingPeriod> + '_ {
        self.periods
            .values()
            .filter(move |p| p.project_id == project_id)
    }

    /// Framework nodes of a project ordered by `sort_order`, then id.
    pub fn nodes_of(&self, project_id: RowId) -> Vec<&FrameworkNode> {
        let mut nodes: Vec<&FrameworkNode> = self
            .framework_nodes
            .values()
            .filter(|n| n.project_id == project_id)
            .collect();
        nodes.sort_by_key(|n| (n.sort_order, n.id));
        nodes
    }

    pub fn indicators_of(&self, project_id: RowId) -> impl Iterator<Item = &Indicator> + '_ {
        self.indicators
            .values()
            .filter(move |i| i.project_id == project_id)
    }

    pub fn activities_of(&self, project_id: RowId) -> impl Iterator<Item = &PortfolioActivity> + '_ {
        self.activities
            .values()
            .filter(move |a| a.project_id == project_id)
    }

    pub fn budget_lines_of(&self, project_id: RowId) -> impl Iterator<Item = &PlannedBudgetLine> + '_ {
        self.budget_lines
            .values()
            .filter(move |b| b.project_id == project_id)
    }

    pub fn target_for(&self, indicator_id: RowId, period_id: RowId) -> Option<&IndicatorTarget> {
        self.targets
            .values()
            .find(|t| t.indicator_id == indicator_id && t.period_id == period_id)
    }

    pub fn actual_for(&self, indicator_id: RowId, period_id: RowId) -> Option<&IndicatorActual> {
        self.actuals
            .values()
            .find(|a| a.indicator_id == indicator_id && a.period_id == period_id)
    }

    // Projects

    pub fn create_project(&mut self, input: &ProjectInput, today: NaiveDate) -> Result<RowId> {
        let input = validate_project(input)?;
        let id = self.allocate();
        self.projects.insert(
            id,
            Project {
                id,
                title: input.title,
                description: input.description,
                start_date: input.start_date,
                end_date: input.end_date,
                status: input.status,
                manager_user: input.manager_user,
                funder: input.funder,
                overhead_rate: input.overhead_rate,
                notes: input.notes,
                revised_on: Some(today),
            },
        );
        info!("created project {}", id);
        Ok(id)
    }

    pub fn update_project(&mut self, id: RowId, input: &ProjectInput, today: NaiveDate) -> Result<()> {
        let input = validate_project(input)?;
        let project = self
            .projects
            .get_mut(&id)
            .ok_or_else(|| PortalError::not_found("Project", id.to_string()))?;
        project.title = input.title;
        project.description = input.description;
        project.start_date = input.start_date;
        project.end_date = input.end_date;
        project.status = input.status;
        project.manager_user = input.manager_user;
        project.funder = input.funder;
        project.overhead_rate = input.overhead_rate;
        project.notes = input.notes;
        project.revised_on = Some(today);
        Ok(())
    }

    /// Insert a fully formed project row, keeping its id. Used by bulk upsert.
    pub(crate) fn put_project(&mut self, project: Project) {
        self.next_id = self.next_id.max(project.id);
        self.projects.insert(project.id, project);
    }

    pub(crate) fn next_row_id(&mut self) -> RowId {
        self.allocate()
    }

    /// Remove a project and every row it owns. Returns the number of rows removed.
    pub fn delete_project(&mut self, id: RowId) -> Result<usize> {
        if self.projects.remove(&id).is_none() {
            return Err(PortalError::not_found("Project", id.to_string()));
        }
        let mut removed = 1;

        let indicator_ids: Vec<RowId> = self.indicators_of(id).map(|i| i.id).collect();
        let period_ids: Vec<RowId> = self.periods_of(id).map(|p| p.id).collect();

        let before = self.total_rows();
        self.framework_nodes.retain(|_, n| n.project_id != id);
        self.indicators.retain(|_, i| i.project_id != id);
        self.periods.retain(|_, p| p.project_id != id);
        self.activities.retain(|_, a| a.project_id != id);
        self.budget_lines.retain(|_, b| b.project_id != id);
        self.targets.retain(|_, t| {
            !indicator_ids.contains(&t.indicator_id) && !period_ids.contains(&t.period_id)
        });
        self.actuals.retain(|_, a| {
            !indicator_ids.contains(&a.indicator_id) && !period_ids.contains(&a.period_id)
        });
        self.mappings
            .retain(|_, m| !indicator_ids.contains(&m.indicator_id));
        removed += before - self.total_rows();

        info!("deleted project {} ({} rows)", id, removed);
        Ok(removed)
    }

    /// Delete every project and everything they own. Strategic indicators stay.
    pub fn delete_all_projects(&mut self) -> usize {
        let count = self.projects.len();
        self.projects.clear();
        self.framework_nodes.clear();
        self.indicators.clear();
        self.periods.clear();
        self.targets.clear();
        self.actuals.clear();
        self.activities.clear();
        self.budget_lines.clear();
        self.mappings.clear();
        info!("deleted all {} project(s)", count);
        count
    }

    fn total_rows(&self) -> usize {
        self.framework_nodes.len()
            + self.indicators.len()
            + self.periods.len()
            + self.targets.len()
            + self.actuals.len()
            + self.activities.len()
            + self.budget_lines.len()
            + self.mappings.len()
    }

    // Framework and indicators

    pub fn add_framework_node(&mut self, input: &FrameworkNodeInput) -> Result<RowId> {
        self.project(input.project_id)?;
        let title = required("title", &input.title)?;
        if let Some(parent_id) = input.parent_node_id {
            match self.framework_nodes.get(&parent_id) {
                Some(parent) if parent.project_id == input.project_id => {}
                _ => return Err(PortalError::not_found("Framework node", parent_id.to_string())),
            }
        }
        let id = self.allocate();
        self.framework_nodes.insert(
            id,
            FrameworkNode {
                id,
                project_id: input.project_id,
                level: input.level,
                parent_node_id: input.parent_node_id,
                title,
                description: input.description.trim().to_string(),
                sort_order: input.sort_order,
            },
        );
        Ok(id)
    }

    fn node_in_project(&self, node_id: RowId, project_id: RowId) -> Result<&FrameworkNode> {
        self.framework_nodes
            .get(&node_id)
            .filter(|n| n.project_id == project_id)
            .ok_or_else(|| PortalError::not_found("Framework node", node_id.to_string()))
    }

    pub fn add_indicator(&mut self, input: &IndicatorInput) -> Result<RowId> {
        self.project(input.project_id)?;
        self.node_in_project(input.framework_node_id, input.project_id)?;
        let name = required("name", &input.name)?;
        let unit = required("unit", &input.unit)?;
        let id = self.allocate();
        self.indicators.insert(
            id,
            Indicator {
                id,
                project_id: input.project_id,
                framework_node_id: input.framework_node_id,
                name,
                unit,
                direction: input.direction,
                requires_disaggregation: input.requires_disaggregation,
                tags: input.tags.trim().to_string(),
            },
        );
        Ok(id)
    }

    // Activities and budgets

    pub fn add_activity(&mut self, input: &ActivityInput) -> Result<RowId> {
        self.project(input.project_id)?;
        let title = required("title", &input.title)?;
        let owner = required("owner_user", &input.owner_user)?;
        ordered(input.start_date, input.end_date)?;
        let node = self.node_in_project(input.framework_node_id, input.project_id)?;
        if node.level != FrameworkLevel::Output {
            return Err(PortalError::validation(
                "framework_node_id",
                "Activities attach to an output",
            ));
        }
        let id = self.allocate();
        self.activities.insert(
            id,
            PortfolioActivity {
                id,
                project_id: input.project_id,
                framework_node_id: input.framework_node_id,
                title,
                start_date: input.start_date,
                end_date: input.end_date,
                status: input.status,
                owner_user: owner,
            },
        );
        Ok(id)
    }

    pub fn add_budget_line(&mut self, input: &BudgetLineInput) -> Result<RowId> {
        self.project(input.project_id)?;
        let fiscal_year = required("fiscal_year", &input.fiscal_year)?;
        let planned_amount = amount("planned_amount", input.planned_amount)?;
        let actual_amount = amount("actual_amount", input.actual_amount)?;
        match self.activities.get(&input.activity_id) {
            Some(a) if a.project_id == input.project_id => {}
            _ => {
                return Err(PortalError::not_found(
                    "Activity",
                    input.activity_id.to_string(),
                ));
            }
        }
        let id = self.allocate();
        self.budget_lines.insert(
            id,
            PlannedBudgetLine {
                id,
                project_id: input.project_id,
                activity_id: input.activity_id,
                fiscal_year,
                planned_amount,
                actual_amount,
            },
        );
        Ok(id)
    }

    // Reporting

    fn check_reporting_pair(&self, indicator_id: RowId, period_id: RowId) -> Result<()> {
        let indicator = self.indicator(indicator_id)?;
        let period = self.period(period_id)?;
        if indicator.project_id != period.project_id {
            return Err(PortalError::validation(
                "period_id",
                "Period belongs to another project",
            ));
        }
        Ok(())
    }

    /// Create or overwrite the target of an indicator for one period.
    pub fn upsert_target(&mut self, indicator_id: RowId, period_id: RowId, value: f64) -> Result<RowId> {
        self.check_reporting_pair(indicator_id, period_id)?;
        if !value.is_finite() {
            return Err(PortalError::validation("target_value", "must be a number"));
        }
        if let Some(existing) = self
            .targets
            .values_mut()
            .find(|t| t.indicator_id == indicator_id && t.period_id == period_id)
        {
            existing.target_value = value;
            return Ok(existing.id);
        }
        let id = self.allocate();
        self.targets.insert(
            id,
            IndicatorTarget {
                id,
                indicator_id,
                period_id,
                target_value: value,
            },
        );
        Ok(id)
    }

    /// Create or overwrite the actual of an indicator for one period.
    pub fn upsert_actual(
        &mut self,
        indicator_id: RowId,
        period_id: RowId,
        value: f64,
        qa_status: QaStatus,
    ) -> Result<RowId> {
        self.check_reporting_pair(indicator_id, period_id)?;
        if !value.is_finite() {
            return Err(PortalError::validation("actual_value", "must be a number"));
        }
        if let Some(existing) = self
            .actuals
            .values_mut()
            .find(|a| a.indicator_id == indicator_id && a.period_id == period_id)
        {
            existing.actual_value = value;
            existing.qa_status = qa_status;
            return Ok(existing.id);
        }
        let id = self.allocate();
        self.actuals.insert(
            id,
            IndicatorActual {
                id,
                indicator_id,
                period_id,
                actual_value: value,
                qa_status,
            },
        );
        Ok(id)
    }

    pub fn set_period_status(&mut self, period_id: RowId, status: PeriodStatus) -> Result<()> {
        let period = self
            .periods
            .get_mut(&period_id)
            .ok_or_else(|| PortalError::not_found("Reporting period", period_id.to_string()))?;
        period.status = status;
        Ok(())
    }

    pub(crate) fn insert_period(&mut self, period: impl FnOnce(RowId) -> ReportingPeriod) -> RowId {
        let id = self.allocate();
        self.periods.insert(id, period(id));
        id
    }

    // Strategic alignment

    pub fn add_strategic_indicator(&mut self, input: &StrategicIndicatorInput) -> Result<RowId> {
        let code = required("code", &input.code)?;
        let name = required("name", &input.name)?;
        let unit = required("unit", &input.unit)?;
        if self
            .strategic_indicators
            .values()
            .any(|s| s.code.eq_ignore_ascii_case(&code))
        {
            return Err(PortalError::Duplicate {
                what: format!("Strategic indicator code '{}'", code),
            });
        }
        let id = self.allocate();
        self.strategic_indicators.insert(
            id,
            StrategicIndicator {
                id,
                code,
                name,
                unit,
                direction: input.direction,
            },
        );
        Ok(id)
    }

    pub fn map_indicator(&mut self, indicator_id: RowId, strategic_indicator_id: RowId) -> Result<RowId> {
        self.indicator(indicator_id)?;
        if !self.strategic_indicators.contains_key(&strategic_indicator_id) {
            return Err(PortalError::not_found(
                "Strategic indicator",
                strategic_indicator_id.to_string(),
            ));
        }
        if self.mappings.values().any(|m| {
            m.indicator_id == indicator_id && m.strategic_indicator_id == strategic_indicator_id
        }) {
            return Err(PortalError::Duplicate {
                what: "Indicator mapping".to_string(),
            });
        }
        let id = self.allocate();
        self.mappings.insert(
            id,
            IndicatorMapping {
                id,
                indicator_id,
                strategic_indicator_id,
            },
        );
        Ok(id)
    }
}
