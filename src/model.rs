//! Logframe entities.
//!
//! The hierarchy is Goal → Outcome → Output → KPI, with Activities (the
//! workplan) and Budget lines hanging off Outputs. Every non-root item
//! carries a parent reference by identifier; ordering is the order of the
//! owning `Vec` in [`crate::logframe::Logframe`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of node the portal knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Goal,
    Outcome,
    Output,
    Kpi,
    Activity,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Goal,
        NodeKind::Outcome,
        NodeKind::Output,
        NodeKind::Kpi,
        NodeKind::Activity,
    ];

    /// Display label used in sheets and numbered labels.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Goal => "Goal",
            NodeKind::Outcome => "Outcome",
            NodeKind::Output => "Output",
            NodeKind::Kpi => "KPI",
            NodeKind::Activity => "Activity",
        }
    }

    /// Parse a level cell. "Impact" is the older name for a Goal.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "goal" | "impact" => Some(NodeKind::Goal),
            "outcome" => Some(NodeKind::Outcome),
            "output" => Some(NodeKind::Output),
            "kpi" | "indicator" => Some(NodeKind::Kpi),
            "activity" => Some(NodeKind::Activity),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Target of a cascading delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Goal(String),
    Outcome(String),
    Output(String),
}

impl NodeRef {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Goal(_) => NodeKind::Goal,
            NodeRef::Outcome(_) => NodeKind::Outcome,
            NodeRef::Output(_) => NodeKind::Output,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            NodeRef::Goal(id) | NodeRef::Outcome(id) | NodeRef::Output(id) => id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub name: String,
    /// `None` only while an import is still resolving parents, or after a
    /// discarded Goal orphaned it.
    pub parent_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub id: String,
    pub name: String,
    pub assumptions: String,
    pub parent_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub baseline: String,
    pub target: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub linked_payment: bool,
    /// Means of verification.
    pub mov: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Planned => "planned",
            ActivityStatus::InProgress => "in_progress",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Cancelled => "cancelled",
        }
    }

    /// Accepts "in_progress", "In Progress" and "in-progress" alike.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "planned" => Some(ActivityStatus::Planned),
            "in_progress" => Some(ActivityStatus::InProgress),
            "completed" | "complete" | "done" => Some(ActivityStatus::Completed),
            "cancelled" | "canceled" => Some(ActivityStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workplan item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub output_id: Option<String>,
    pub name: String,
    pub owner: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ActivityStatus,
    /// Percent complete, 0..=100.
    pub progress: u8,
    pub kpi_ids: Vec<String>,
    pub milestones: Vec<String>,
    /// Ids of activities this one waits on.
    pub dependencies: Vec<String>,
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub id: String,
    pub output_id: Option<String>,
    pub item: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub currency: String,
    /// `quantity * unit_cost`, refreshed by every write path.
    pub total: f64,
}

impl BudgetLine {
    pub fn recompute_total(&mut self) {
        self.total = self.quantity * self.unit_cost;
    }
}

/// The Identification sheet: project metadata kept beside the hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub title: String,
    pub pi_name: String,
    pub pi_email: String,
    pub institution: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
}
