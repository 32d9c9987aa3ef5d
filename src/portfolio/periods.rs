use chrono::{Datelike, Duration, NaiveDate};
use log::info;

use super::{PeriodStatus, PortfolioStore, ReportingPeriod, RowId};
use crate::error::{PortalError, Result};

pub const BASELINE_LABEL: &str = "Baseline";

/// Days between the end of a period and its report deadline.
pub const REPORT_GRACE_DAYS: i64 = 15;

const QUARTERS: [(&str, u32, u32); 4] = [("Q1", 1, 3), ("Q2", 4, 6), ("Q3", 7, 9), ("Q4", 10, 12)];

/// True if `[a_start, a_end]` overlaps `[p_start, p_end]`. Both ends inclusive.
pub fn overlaps(a_start: NaiveDate, a_end: NaiveDate, p_start: NaiveDate, p_end: NaiveDate) -> bool {
    !(a_end < p_start || a_start > p_end)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Create the Baseline period and one period per calendar quarter the
/// project overlaps.
///
/// Periods whose label already exists for the project are left alone, so
/// calling this again after extending a project only adds the new quarters.
/// Returns the number of periods created.
pub fn generate_reporting_periods(store: &mut PortfolioStore, project_id: RowId) -> Result<usize> {
    let project = store.project(project_id)?;
    let (start, end) = (project.start_date, project.end_date);

    let mut wanted: Vec<(String, NaiveDate, NaiveDate)> = vec![(BASELINE_LABEL.to_string(), start, start)];
    for year in start.year()..=end.year() {
        for (quarter, first_month, last_month) in QUARTERS {
            let q_start = NaiveDate::from_ymd_opt(year, first_month, 1);
            let q_end = last_day_of_month(year, last_month);
            let (Some(q_start), Some(q_end)) = (q_start, q_end) else {
                return Err(PortalError::validation(
                    "end_date",
                    format!("year {} is out of range", year),
                ));
            };
            if overlaps(q_start, q_end, start, end) {
                wanted.push((format!("{} {}", quarter, year), q_start, q_end));
            }
        }
    }

    let existing: Vec<String> = store.periods_of(project_id).map(|p| p.label.clone()).collect();
    let mut created = 0;
    for (label, period_start, period_end) in wanted {
        if existing.contains(&label) {
            continue;
        }
        store.insert_period(|id| ReportingPeriod {
            id,
            project_id,
            label,
            start_date: period_start,
            end_date: period_end,
            due_date: period_end + Duration::days(REPORT_GRACE_DAYS),
            status: PeriodStatus::Open,
        });
        created += 1;
    }

    info!(
        "generated {} reporting period(s) for project {}",
        created, project_id
    );
    Ok(created)
}

/// Generate periods for every project that has none, such as projects
/// created through the CSV upsert. Returns the number of periods created.
pub fn generate_missing_periods(store: &mut PortfolioStore) -> Result<usize> {
    let missing: Vec<RowId> = store
        .projects
        .keys()
        .copied()
        .filter(|&id| store.periods_of(id).next().is_none())
        .collect();

    let mut created = 0;
    for project_id in &missing {
        created += generate_reporting_periods(store, *project_id)?;
    }
    info!(
        "generated {} reporting period(s) for {} project(s) without periods",
        created,
        missing.len()
    );
    Ok(created)
}

/// Whether a period counts as overdue on `today`, whatever its stored status.
pub fn is_effectively_overdue(period: &ReportingPeriod, today: NaiveDate) -> bool {
    match period.status {
        PeriodStatus::Overdue => true,
        PeriodStatus::Planned | PeriodStatus::Open => period.due_date < today,
        PeriodStatus::Submitted | PeriodStatus::Approved => false,
    }
}

/// Flip planned or open periods past their due date to overdue.
/// Returns how many were changed.
pub fn mark_overdue_periods(store: &mut PortfolioStore, today: NaiveDate) -> usize {
    let mut updated = 0;
    for period in store.periods.values_mut() {
        if matches!(period.status, PeriodStatus::Planned | PeriodStatus::Open) && period.due_date < today {
            period.status = PeriodStatus::Overdue;
            updated += 1;
        }
    }
    if updated > 0 {
        info!("marked {} reporting period(s) overdue", updated);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_ends_follow_the_calendar() {
        assert_eq!(last_day_of_month(2024, 2), Some(date(2024, 2, 29)));
        assert_eq!(last_day_of_month(2025, 2), Some(date(2025, 2, 28)));
        assert_eq!(last_day_of_month(2025, 12), Some(date(2025, 12, 31)));
        assert_eq!(last_day_of_month(2025, 6), Some(date(2025, 6, 30)));
    }

    #[test]
    fn overlap_is_inclusive() {
        let (a, b) = (date(2025, 1, 1), date(2025, 3, 31));
        assert!(overlaps(a, b, date(2025, 3, 31), date(2025, 6, 30)));
        assert!(!overlaps(a, b, date(2025, 4, 1), date(2025, 6, 30)));
    }
}
