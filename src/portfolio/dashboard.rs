//! Read-only portfolio views: headline metrics, project progress, recent
//! reporting activity and strategic alignment.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use super::periods::is_effectively_overdue;
use super::{PeriodStatus, PortfolioStore, ProjectStatus, RowId};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BudgetTotals {
    pub planned: f64,
    pub actual: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub total_planned: f64,
    pub total_actual: f64,
    pub planned_projects: usize,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub open_periods: usize,
    pub overdue_periods: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecentEntry {
    pub period_id: RowId,
    pub label: String,
    pub project_title: String,
    pub due_date: NaiveDate,
    /// Stored status, except open periods past due show as overdue.
    pub status: PeriodStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrategicStatus {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub on_track: usize,
    pub checked: usize,
}

pub fn budget_totals(store: &PortfolioStore, project_id: RowId) -> BudgetTotals {
    store
        .budget_lines_of(project_id)
        .fold(BudgetTotals::default(), |mut totals, line| {
            totals.planned += line.planned_amount;
            totals.actual += line.actual_amount;
            totals
        })
}

pub fn portfolio_metrics(store: &PortfolioStore, today: NaiveDate) -> PortfolioMetrics {
    let mut metrics = PortfolioMetrics::default();

    for line in store.budget_lines.values() {
        metrics.total_planned += line.planned_amount;
        metrics.total_actual += line.actual_amount;
    }
    for project in store.projects.values() {
        match project.status {
            ProjectStatus::Planned => metrics.planned_projects += 1,
            ProjectStatus::InProgress => metrics.active_projects += 1,
            ProjectStatus::Completed => metrics.completed_projects += 1,
        }
    }
    for period in store.periods.values() {
        if is_effectively_overdue(period, today) {
            metrics.overdue_periods += 1;
        } else if period.status == PeriodStatus::Open {
            metrics.open_periods += 1;
        }
    }

    metrics
}

/// Share of the project's duration elapsed on `today`, as a whole percentage.
pub fn project_progress_pct(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> u8 {
    if today <= start {
        return 0;
    }
    if today >= end {
        return 100;
    }
    let elapsed = (today - start).num_days() as f64;
    let total = (end - start).num_days().max(1) as f64;
    (elapsed / total * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Latest reporting periods by due date, newest first.
pub fn recent_activity(store: &PortfolioStore, limit: usize, today: NaiveDate) -> Vec<RecentEntry> {
    let mut periods: Vec<_> = store.periods.values().collect();
    periods.sort_by(|a, b| b.due_date.cmp(&a.due_date).then(a.id.cmp(&b.id)));

    periods
        .into_iter()
        .take(limit)
        .map(|period| {
            let status = if period.status == PeriodStatus::Open && today > period.due_date {
                PeriodStatus::Overdue
            } else {
                period.status
            };
            RecentEntry {
                period_id: period.id,
                label: period.label.clone(),
                project_title: store
                    .projects
                    .get(&period.project_id)
                    .map(|p| p.title.clone())
                    .unwrap_or_else(|| "Unknown project".to_string()),
                due_date: period.due_date,
                status,
            }
        })
        .collect()
}

/// For every strategic indicator, how many mapped (target, actual) pairs
/// were checked and how many of them are on track.
pub fn strategic_status(store: &PortfolioStore) -> Vec<StrategicStatus> {
    store
        .strategic_indicators
        .values()
        .map(|strategic| {
            let mapped: HashSet<RowId> = store
                .mappings
                .values()
                .filter(|m| m.strategic_indicator_id == strategic.id)
                .map(|m| m.indicator_id)
                .collect();

            let mut checked = 0;
            let mut on_track = 0;
            for target in store.targets.values() {
                if !mapped.contains(&target.indicator_id)
                    || !store.indicators.contains_key(&target.indicator_id)
                {
                    continue;
                }
                let Some(actual) = store.actual_for(target.indicator_id, target.period_id) else {
                    continue;
                };
                checked += 1;
                if strategic
                    .direction
                    .on_track(actual.actual_value, target.target_value)
                {
                    on_track += 1;
                }
            }

            StrategicStatus {
                code: strategic.code.clone(),
                name: strategic.name.clone(),
                unit: strategic.unit.clone(),
                on_track,
                checked,
            }
        })
        .collect()
}
