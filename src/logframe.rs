//! The Hierarchy Store.
//!
//! One [`Logframe`] holds everything a single applicant is editing: the
//! Goal/Outcome/Output/KPI tree, the workplan, the budget and the
//! Identification record. The web layer keeps one instance per session and
//! passes it by reference into each handler.
//!
//! Every mutating operation validates first and only then touches state, so
//! a `PortalError::Validation` always means nothing changed.

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};
use crate::format::strip_label_prefix;
use crate::ids::generate_id;
use crate::model::{
    Activity, ActivityStatus, BudgetLine, Goal, Kpi, NodeKind, NodeRef, Outcome, Output,
    ProjectInfo,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Logframe {
    pub goals: Vec<Goal>,
    pub outcomes: Vec<Outcome>,
    pub outputs: Vec<Output>,
    pub kpis: Vec<Kpi>,
    pub activities: Vec<Activity>,
    pub budget: Vec<BudgetLine>,
    pub project: ProjectInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiDraft {
    pub output_id: String,
    pub name: String,
    pub baseline: String,
    pub target: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub linked_payment: bool,
    pub mov: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityDraft {
    pub output_id: Option<String>,
    pub name: String,
    pub owner: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ActivityStatus,
    pub progress: u8,
    pub kpi_ids: Vec<String>,
    pub milestones: Vec<String>,
    pub dependencies: Vec<String>,
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetDraft {
    pub output_id: Option<String>,
    pub item: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub currency: String,
}

/// What a cascading delete removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub goals: usize,
    pub outcomes: usize,
    pub outputs: usize,
    pub kpis: usize,
    pub activities: usize,
    pub budget_lines: usize,
}

impl DeleteReport {
    pub fn total(&self) -> usize {
        self.goals + self.outcomes + self.outputs + self.kpis + self.activities + self.budget_lines
    }
}

/// A reference that points at nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingRef {
    pub kind: String,
    pub id: String,
    pub missing: String,
}

fn required(field: &str, value: &str, kind: Option<NodeKind>) -> Result<String> {
    let cleaned = match kind {
        Some(kind) => strip_label_prefix(value, kind),
        None => value.trim().to_string(),
    };
    if cleaned.is_empty() {
        return Err(PortalError::validation(field, "is required"));
    }
    Ok(cleaned)
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(PortalError::validation(
                "start_date",
                "start date must be on or before end date",
            ));
        }
    }
    Ok(())
}

fn check_amount(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PortalError::validation(field, "must be a non-negative number"));
    }
    Ok(())
}

fn removed<T>(items: &mut Vec<T>, keep: impl FnMut(&T) -> bool) -> usize {
    let before = items.len();
    items.retain(keep);
    before - items.len()
}

impl Logframe {
    pub fn new() -> Self {
        Logframe::default()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
            && self.outcomes.is_empty()
            && self.outputs.is_empty()
            && self.kpis.is_empty()
            && self.activities.is_empty()
            && self.budget.is_empty()
    }

    // ---- lookups ----

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    pub fn output(&self, id: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn kpi(&self, id: &str) -> Option<&Kpi> {
        self.kpis.iter().find(|k| k.id == id)
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn budget_line(&self, id: &str) -> Option<&BudgetLine> {
        self.budget.iter().find(|b| b.id == id)
    }

    pub fn outcomes_of<'a>(&'a self, goal_id: &'a str) -> impl Iterator<Item = &'a Outcome> + 'a {
        self.outcomes
            .iter()
            .filter(move |o| o.parent_id.as_deref() == Some(goal_id))
    }

    pub fn outputs_of<'a>(&'a self, outcome_id: &'a str) -> impl Iterator<Item = &'a Output> + 'a {
        self.outputs
            .iter()
            .filter(move |o| o.parent_id.as_deref() == Some(outcome_id))
    }

    pub fn kpis_of<'a>(&'a self, output_id: &'a str) -> impl Iterator<Item = &'a Kpi> + 'a {
        self.kpis
            .iter()
            .filter(move |k| k.parent_id.as_deref() == Some(output_id))
    }

    pub fn activities_of<'a>(
        &'a self,
        output_id: &'a str,
    ) -> impl Iterator<Item = &'a Activity> + 'a {
        self.activities
            .iter()
            .filter(move |a| a.output_id.as_deref() == Some(output_id))
    }

    /// Sum of every budget line total.
    pub fn funding_total(&self) -> f64 {
        self.budget.iter().map(|b| b.total).sum()
    }

    fn require_goal(&self, id: &str) -> Result<()> {
        self.goal(id)
            .map(|_| ())
            .ok_or_else(|| PortalError::not_found("Goal", id))
    }

    fn require_outcome(&self, id: &str) -> Result<()> {
        self.outcome(id)
            .map(|_| ())
            .ok_or_else(|| PortalError::not_found("Outcome", id))
    }

    fn require_output(&self, id: &str) -> Result<()> {
        self.output(id)
            .map(|_| ())
            .ok_or_else(|| PortalError::not_found("Output", id))
    }

    // ---- create ----

    pub fn add_goal(&mut self, name: &str) -> Result<String> {
        let name = required("name", name, Some(NodeKind::Goal))?;
        let id = generate_id();
        self.goals.push(Goal {
            id: id.clone(),
            name,
        });
        debug!("added goal {}", id);
        Ok(id)
    }

    pub fn add_outcome(&mut self, name: &str, goal_id: &str) -> Result<String> {
        let name = required("name", name, Some(NodeKind::Outcome))?;
        self.require_goal(goal_id)?;
        let id = generate_id();
        self.outcomes.push(Outcome {
            id: id.clone(),
            name,
            parent_id: Some(goal_id.to_string()),
        });
        debug!("added outcome {} under goal {}", id, goal_id);
        Ok(id)
    }

    pub fn add_output(&mut self, name: &str, assumptions: &str, outcome_id: &str) -> Result<String> {
        let name = required("name", name, Some(NodeKind::Output))?;
        self.require_outcome(outcome_id)?;
        let id = generate_id();
        self.outputs.push(Output {
            id: id.clone(),
            name,
            assumptions: assumptions.trim().to_string(),
            parent_id: Some(outcome_id.to_string()),
        });
        debug!("added output {} under outcome {}", id, outcome_id);
        Ok(id)
    }

    fn kpi_from_draft(&self, id: String, draft: &KpiDraft) -> Result<Kpi> {
        let name = required("name", &draft.name, Some(NodeKind::Kpi))?;
        self.require_output(&draft.output_id)?;
        check_dates(draft.start_date, draft.end_date)?;
        Ok(Kpi {
            id,
            name,
            parent_id: Some(draft.output_id.clone()),
            baseline: draft.baseline.trim().to_string(),
            target: draft.target.trim().to_string(),
            start_date: draft.start_date,
            end_date: draft.end_date,
            linked_payment: draft.linked_payment,
            mov: draft.mov.trim().to_string(),
        })
    }

    pub fn add_kpi(&mut self, draft: &KpiDraft) -> Result<String> {
        let kpi = self.kpi_from_draft(generate_id(), draft)?;
        let id = kpi.id.clone();
        self.kpis.push(kpi);
        Ok(id)
    }

    fn activity_from_draft(&self, id: String, draft: &ActivityDraft) -> Result<Activity> {
        let name = required("name", &draft.name, Some(NodeKind::Activity))?;
        let owner = required("owner", &draft.owner, None)?;
        check_dates(draft.start_date, draft.end_date)?;
        if draft.progress > 100 {
            return Err(PortalError::validation("progress", "must be between 0 and 100"));
        }
        if let Some(output_id) = &draft.output_id {
            self.require_output(output_id)?;
        }
        for kpi_id in &draft.kpi_ids {
            let kpi = self
                .kpi(kpi_id)
                .ok_or_else(|| PortalError::not_found("KPI", kpi_id.as_str()))?;
            if kpi.parent_id.is_none() || kpi.parent_id != draft.output_id {
                return Err(PortalError::validation(
                    "kpi_ids",
                    format!("KPI '{}' does not belong to the activity's output", kpi.name),
                ));
            }
        }
        for dep in &draft.dependencies {
            if *dep == id {
                return Err(PortalError::validation(
                    "dependencies",
                    "an activity cannot depend on itself",
                ));
            }
            if self.activity(dep).is_none() {
                return Err(PortalError::not_found("Activity", dep.as_str()));
            }
        }
        Ok(Activity {
            id,
            output_id: draft.output_id.clone(),
            name,
            owner,
            start_date: draft.start_date,
            end_date: draft.end_date,
            status: draft.status,
            progress: draft.progress,
            kpi_ids: draft.kpi_ids.clone(),
            milestones: draft
                .milestones
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            dependencies: draft.dependencies.clone(),
            notes: draft.notes.trim().to_string(),
        })
    }

    pub fn add_activity(&mut self, draft: &ActivityDraft) -> Result<String> {
        let activity = self.activity_from_draft(generate_id(), draft)?;
        let id = activity.id.clone();
        self.activities.push(activity);
        Ok(id)
    }

    fn budget_from_draft(&self, id: String, draft: &BudgetDraft) -> Result<BudgetLine> {
        let item = required("item", &draft.item, None)?;
        if let Some(output_id) = &draft.output_id {
            self.require_output(output_id)?;
        }
        check_amount("quantity", draft.quantity)?;
        check_amount("unit_cost", draft.unit_cost)?;
        let mut line = BudgetLine {
            id,
            output_id: draft.output_id.clone(),
            item,
            category: draft.category.trim().to_string(),
            unit: draft.unit.trim().to_string(),
            quantity: draft.quantity,
            unit_cost: draft.unit_cost,
            currency: draft.currency.trim().to_string(),
            total: 0.0,
        };
        line.recompute_total();
        Ok(line)
    }

    pub fn add_budget_line(&mut self, draft: &BudgetDraft) -> Result<String> {
        let line = self.budget_from_draft(generate_id(), draft)?;
        let id = line.id.clone();
        self.budget.push(line);
        Ok(id)
    }

    // ---- edit ----

    pub fn rename_goal(&mut self, id: &str, name: &str) -> Result<()> {
        let name = required("name", name, Some(NodeKind::Goal))?;
        let goal = self
            .goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| PortalError::not_found("Goal", id))?;
        goal.name = name;
        Ok(())
    }

    pub fn update_outcome(&mut self, id: &str, name: &str, goal_id: &str) -> Result<()> {
        let name = required("name", name, Some(NodeKind::Outcome))?;
        self.require_goal(goal_id)?;
        let outcome = self
            .outcomes
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| PortalError::not_found("Outcome", id))?;
        outcome.name = name;
        outcome.parent_id = Some(goal_id.to_string());
        Ok(())
    }

    pub fn update_output(
        &mut self,
        id: &str,
        name: &str,
        assumptions: &str,
        outcome_id: &str,
    ) -> Result<()> {
        let name = required("name", name, Some(NodeKind::Output))?;
        self.require_outcome(outcome_id)?;
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| PortalError::not_found("Output", id))?;
        output.name = name;
        output.assumptions = assumptions.trim().to_string();
        output.parent_id = Some(outcome_id.to_string());
        Ok(())
    }

    pub fn update_kpi(&mut self, id: &str, draft: &KpiDraft) -> Result<()> {
        let idx = self
            .kpis
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| PortalError::not_found("KPI", id))?;
        let updated = self.kpi_from_draft(id.to_string(), draft)?;
        let moved = self.kpis[idx].parent_id != updated.parent_id;
        self.kpis[idx] = updated;
        if moved {
            // Activities under the old output may no longer link it.
            for activity in &mut self.activities {
                if activity.output_id != self.kpis[idx].parent_id {
                    activity.kpi_ids.retain(|k| k != id);
                }
            }
        }
        Ok(())
    }

    pub fn update_activity(&mut self, id: &str, draft: &ActivityDraft) -> Result<()> {
        let idx = self
            .activities
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| PortalError::not_found("Activity", id))?;
        self.activities[idx] = self.activity_from_draft(id.to_string(), draft)?;
        Ok(())
    }

    /// Replace a budget line's fields; the total is recomputed.
    pub fn update_budget_line(&mut self, id: &str, draft: &BudgetDraft) -> Result<()> {
        let idx = self
            .budget
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| PortalError::not_found("Budget line", id))?;
        self.budget[idx] = self.budget_from_draft(id.to_string(), draft)?;
        Ok(())
    }

    pub fn set_project_info(&mut self, info: ProjectInfo) -> Result<()> {
        check_dates(info.start_date, info.end_date)?;
        self.project = info;
        Ok(())
    }

    // ---- delete ----

    /// Remove a Goal, Outcome or Output together with everything beneath it.
    ///
    /// Activities and budget lines attached to a removed Output go with it,
    /// and removed KPI ids are pruned from surviving activities.
    pub fn delete(&mut self, node: &NodeRef) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        match node {
            NodeRef::Goal(id) => {
                self.require_goal(id)?;
                self.delete_goal(id, &mut report);
            }
            NodeRef::Outcome(id) => {
                self.require_outcome(id)?;
                self.delete_outcome(id, &mut report);
            }
            NodeRef::Output(id) => {
                self.require_output(id)?;
                self.delete_output(id, &mut report);
            }
        }
        info!(
            "deleted {} {} with {} descendant records",
            node.kind(),
            node.id(),
            report.total().saturating_sub(1)
        );
        Ok(report)
    }

    fn delete_goal(&mut self, id: &str, report: &mut DeleteReport) {
        let children: Vec<String> = self.outcomes_of(id).map(|o| o.id.clone()).collect();
        for child in children {
            self.delete_outcome(&child, report);
        }
        report.goals += removed(&mut self.goals, |g| g.id != id);
    }

    fn delete_outcome(&mut self, id: &str, report: &mut DeleteReport) {
        let children: Vec<String> = self.outputs_of(id).map(|o| o.id.clone()).collect();
        for child in children {
            self.delete_output(&child, report);
        }
        report.outcomes += removed(&mut self.outcomes, |o| o.id != id);
    }

    fn delete_output(&mut self, id: &str, report: &mut DeleteReport) {
        let kpi_ids: Vec<String> = self.kpis_of(id).map(|k| k.id.clone()).collect();
        let activity_ids: Vec<String> = self.activities_of(id).map(|a| a.id.clone()).collect();

        report.kpis += removed(&mut self.kpis, |k| k.parent_id.as_deref() != Some(id));
        report.activities += removed(&mut self.activities, |a| {
            a.output_id.as_deref() != Some(id)
        });
        report.budget_lines += removed(&mut self.budget, |b| b.output_id.as_deref() != Some(id));
        for activity in &mut self.activities {
            activity.kpi_ids.retain(|k| !kpi_ids.contains(k));
            activity.dependencies.retain(|d| !activity_ids.contains(d));
        }
        report.outputs += removed(&mut self.outputs, |o| o.id != id);
    }

    pub fn remove_kpi(&mut self, id: &str) -> Result<()> {
        if removed(&mut self.kpis, |k| k.id != id) == 0 {
            return Err(PortalError::not_found("KPI", id));
        }
        for activity in &mut self.activities {
            activity.kpi_ids.retain(|k| k != id);
        }
        Ok(())
    }

    pub fn remove_activity(&mut self, id: &str) -> Result<()> {
        if removed(&mut self.activities, |a| a.id != id) == 0 {
            return Err(PortalError::not_found("Activity", id));
        }
        for activity in &mut self.activities {
            activity.dependencies.retain(|d| d != id);
        }
        Ok(())
    }

    pub fn remove_budget_line(&mut self, id: &str) -> Result<()> {
        if removed(&mut self.budget, |b| b.id != id) == 0 {
            return Err(PortalError::not_found("Budget line", id));
        }
        Ok(())
    }

    /// Parent and link references that do not resolve.
    pub fn dangling_references(&self) -> Vec<DanglingRef> {
        let mut dangling = Vec::new();
        let mut push = |kind: &str, id: &str, missing: &str| {
            dangling.push(DanglingRef {
                kind: kind.to_string(),
                id: id.to_string(),
                missing: missing.to_string(),
            })
        };

        for outcome in &self.outcomes {
            match &outcome.parent_id {
                Some(p) if self.goal(p).is_some() => {}
                Some(p) => push("Outcome", &outcome.id, p),
                None => push("Outcome", &outcome.id, ""),
            }
        }
        for output in &self.outputs {
            match &output.parent_id {
                Some(p) if self.outcome(p).is_some() => {}
                Some(p) => push("Output", &output.id, p),
                None => push("Output", &output.id, ""),
            }
        }
        for kpi in &self.kpis {
            match &kpi.parent_id {
                Some(p) if self.output(p).is_some() => {}
                Some(p) => push("KPI", &kpi.id, p),
                None => push("KPI", &kpi.id, ""),
            }
        }
        for activity in &self.activities {
            if let Some(p) = &activity.output_id {
                if self.output(p).is_none() {
                    push("Activity", &activity.id, p);
                }
            }
            for k in &activity.kpi_ids {
                if self.kpi(k).is_none() {
                    push("Activity", &activity.id, k);
                }
            }
        }
        for line in &self.budget {
            if let Some(p) = &line.output_id {
                if self.output(p).is_none() {
                    push("Budget line", &line.id, p);
                }
            }
        }
        dangling
    }
}
