//! Relational project portfolio.
//!
//! Where a [`crate::logframe::Logframe`] holds a single application, the
//! portfolio tracks many funded projects together with their results
//! framework, indicators, reporting periods, activities and budgets. Rows
//! are integer-keyed and owned by a project; deleting a project removes
//! everything it owns.

pub mod admin;
pub mod dashboard;
pub mod periods;
pub mod store;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use admin::{PROJECT_FIELDS, UpsertSummary, export_projects_csv, projects_sheet, upsert_projects};
pub use dashboard::{
    BudgetTotals, PortfolioMetrics, RecentEntry, StrategicStatus, budget_totals,
    portfolio_metrics, project_progress_pct, recent_activity, strategic_status,
};
pub use periods::{
    generate_missing_periods, generate_reporting_periods, mark_overdue_periods, overlaps,
};
pub use store::{
    ActivityInput, BudgetLineInput, FrameworkNodeInput, IndicatorInput, PortfolioStore,
    ProjectInput, StrategicIndicatorInput,
};

pub type RowId = u64;

/// Overhead applied when a project does not state one.
pub const DEFAULT_OVERHEAD_RATE: f64 = 0.15;

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case-insensitive; spaces and hyphens count as underscores.
            pub fn parse(value: &str) -> Option<Self> {
                let wanted = value.trim().to_lowercase().replace([' ', '-'], "_");
                Self::ALL.iter().copied().find(|v| v.as_str() == wanted)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Lifecycle of a project or a portfolio activity.
    ProjectStatus {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
    }
);

labelled_enum!(
    PeriodStatus {
        Planned => "planned",
        Open => "open",
        Submitted => "submitted",
        Approved => "approved",
        Overdue => "overdue",
    }
);

labelled_enum!(
    FrameworkLevel {
        Output => "output",
        Outcome => "outcome",
    }
);

labelled_enum!(
    /// Which way an indicator has to move to be on track.
    Direction {
        Increase => "increase",
        Decrease => "decrease",
    }
);

labelled_enum!(
    QaStatus {
        Draft => "draft",
        Approved => "approved",
    }
);

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Planned
    }
}

impl Default for QaStatus {
    fn default() -> Self {
        QaStatus::Draft
    }
}

impl Direction {
    /// Whether `actual` meets `target` in this direction.
    pub fn on_track(&self, actual: f64, target: f64) -> bool {
        match self {
            Direction::Increase => actual >= target,
            Direction::Decrease => actual <= target,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RowId,
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ProjectStatus,
    /// Manager e-mail address.
    pub manager_user: String,
    pub funder: String,
    pub overhead_rate: f64,
    pub notes: String,
    pub revised_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameworkNode {
    pub id: RowId,
    pub project_id: RowId,
    pub level: FrameworkLevel,
    pub parent_node_id: Option<RowId>,
    pub title: String,
    pub description: String,
    pub sort_order: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: RowId,
    pub project_id: RowId,
    /// Usually an output node.
    pub framework_node_id: RowId,
    pub name: String,
    pub unit: String,
    pub direction: Direction,
    pub requires_disaggregation: bool,
    pub tags: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub id: RowId,
    pub project_id: RowId,
    /// "Baseline" or "Q<n> <year>", unique within a project.
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: PeriodStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTarget {
    pub id: RowId,
    pub indicator_id: RowId,
    pub period_id: RowId,
    pub target_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorActual {
    pub id: RowId,
    pub indicator_id: RowId,
    pub period_id: RowId,
    pub actual_value: f64,
    pub qa_status: QaStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioActivity {
    pub id: RowId,
    pub project_id: RowId,
    /// Always an output node of the same project.
    pub framework_node_id: RowId,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ProjectStatus,
    pub owner_user: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedBudgetLine {
    pub id: RowId,
    pub project_id: RowId,
    pub activity_id: RowId,
    pub fiscal_year: String,
    pub planned_amount: f64,
    pub actual_amount: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategicIndicator {
    pub id: RowId,
    /// Unique across the portfolio.
    pub code: String,
    pub name: String,
    pub unit: String,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorMapping {
    pub id: RowId,
    pub indicator_id: RowId,
    pub strategic_indicator_id: RowId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_loosely() {
        assert_eq!(ProjectStatus::parse("In Progress"), Some(ProjectStatus::InProgress));
        assert_eq!(ProjectStatus::parse("in-progress"), Some(ProjectStatus::InProgress));
        assert_eq!(PeriodStatus::parse("OVERDUE"), Some(PeriodStatus::Overdue));
        assert_eq!(Direction::parse("sideways"), None);
        assert_eq!(ProjectStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn direction_decides_on_track() {
        assert!(Direction::Increase.on_track(10.0, 10.0));
        assert!(!Direction::Increase.on_track(9.0, 10.0));
        assert!(Direction::Decrease.on_track(3.0, 5.0));
    }
}
