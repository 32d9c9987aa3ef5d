use chrono::NaiveDate;
use grant_portal::export::{BUDGET_SHEET, SUMMARY_COLUMNS, SUMMARY_SHEET, WORKPLAN_SHEET};
use grant_portal::{
    ActivityDraft, ActivityStatus, BudgetDraft, CellValue, DateOrder, KpiDraft, Logframe,
    PortalError, Sheet, Workbook, build_workbook, reconcile,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample() -> Logframe {
    let mut lf = Logframe::new();
    lf.project.title = "School Meals".into();
    lf.project.pi_name = "A. Mensah".into();
    lf.project.start_date = Some(date(2025, 1, 1));
    lf.project.end_date = Some(date(2026, 12, 31));

    let goal = lf.add_goal("Children learn better").unwrap();
    let outcome = lf.add_outcome("Pupils attend school daily", &goal).unwrap();
    let kitchens = lf.add_output("Kitchens running", "Stable food prices", &outcome).unwrap();
    let cooks = lf.add_output("Cooks trained", "", &outcome).unwrap();

    let meals = lf
        .add_kpi(&KpiDraft {
            output_id: kitchens.clone(),
            name: "Meals served per day".into(),
            baseline: "0".into(),
            target: "5000".into(),
            start_date: Some(date(2025, 2, 1)),
            end_date: Some(date(2025, 11, 30)),
            linked_payment: true,
            mov: "Kitchen logs".into(),
        })
        .unwrap();
    lf.add_kpi(&KpiDraft {
        output_id: cooks.clone(),
        name: "Cooks certified".into(),
        target: "40".into(),
        ..KpiDraft::default()
    })
    .unwrap();

    let build = lf
        .add_activity(&ActivityDraft {
            output_id: Some(kitchens.clone()),
            name: "Build kitchens".into(),
            owner: "Works unit".into(),
            start_date: Some(date(2025, 1, 15)),
            end_date: Some(date(2025, 6, 30)),
            status: ActivityStatus::InProgress,
            progress: 60,
            kpi_ids: vec![meals],
            milestones: vec!["Design".into(), "Handover".into()],
            notes: "Two districts first".into(),
            ..ActivityDraft::default()
        })
        .unwrap();
    lf.add_activity(&ActivityDraft {
        output_id: Some(kitchens.clone()),
        name: "Stock pantries".into(),
        owner: "Logistics".into(),
        dependencies: vec![build],
        ..ActivityDraft::default()
    })
    .unwrap();

    lf.add_budget_line(&BudgetDraft {
        output_id: Some(kitchens),
        item: "Stoves".into(),
        category: "Equipment".into(),
        unit: "each".into(),
        quantity: 20.0,
        unit_cost: 350.0,
        currency: "USD".into(),
    })
    .unwrap();
    lf.add_budget_line(&BudgetDraft {
        output_id: Some(cooks),
        item: "Trainer fees".into(),
        quantity: 10.0,
        unit_cost: 120.5,
        ..BudgetDraft::default()
    })
    .unwrap();
    lf
}

fn replace_sheet(book: &mut Workbook, sheet: Sheet) {
    book.sheets.retain(|s| s.name != sheet.name);
    book.add_sheet(sheet);
}

fn summary(rows: &[(&str, &str, &str)]) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_SHEET, &SUMMARY_COLUMNS);
    for (level, name, parent) in rows {
        sheet.push_row(vec![(*level).into(), (*name).into(), (*parent).into(), CellValue::Empty]);
    }
    sheet
}

#[test]
fn export_then_import_keeps_structure() {
    println!("Test 1: round trip through the workbook");
    let original = sample();
    let book = build_workbook(&original);

    let mut imported = Logframe::new();
    let report = reconcile(&book, &mut imported, DateOrder::DayFirst).unwrap();

    assert_eq!(report.goals, 1);
    assert_eq!(report.outcomes, 1);
    assert_eq!(report.outputs, 2);
    assert_eq!(report.kpis, 2);
    assert_eq!(report.activities, 2);
    assert_eq!(report.budget_lines, 2);
    assert_eq!(report.dropped_kpis + report.dropped_activities + report.dropped_budget_lines, 0);
    assert!(report.ambiguous.is_empty());
    assert!(report.identification_imported);
    assert!(imported.dangling_references().is_empty());

    assert_eq!(imported.project.title, "School Meals");
    assert_eq!(imported.project.start_date, Some(date(2025, 1, 1)));

    let kitchens = imported.outputs.iter().find(|o| o.name == "Kitchens running").unwrap();
    assert_eq!(kitchens.assumptions, "Stable food prices");

    let meals = imported.kpis.iter().find(|k| k.name == "Meals served per day").unwrap();
    assert_eq!(meals.parent_id.as_deref(), Some(kitchens.id.as_str()));
    assert_eq!(meals.start_date, Some(date(2025, 2, 1)));
    assert!(meals.linked_payment);
    assert_eq!(meals.target, "5000");

    let build = imported.activities.iter().find(|a| a.name == "Build kitchens").unwrap();
    assert_eq!(build.kpi_ids, vec![meals.id.clone()]);
    assert_eq!(build.status, ActivityStatus::InProgress);
    assert_eq!(build.progress, 60);
    assert_eq!(build.milestones, vec!["Design", "Handover"]);
    assert_eq!(build.end_date, Some(date(2025, 6, 30)));

    let stock = imported.activities.iter().find(|a| a.name == "Stock pantries").unwrap();
    assert_eq!(stock.dependencies, vec![build.id.clone()]);

    assert_eq!(imported.funding_total(), original.funding_total());
    println!("✓ Hierarchy, links and totals preserved");
}

#[test]
fn failed_import_leaves_state_unchanged() {
    println!("Test 2: a bad number aborts the import");
    let mut book = build_workbook(&sample());
    let mut budget = book.sheet(BUDGET_SHEET).unwrap().clone();
    budget.rows[1][5] = "lots".into();
    replace_sheet(&mut book, budget);

    let mut current = sample();
    let before = current.clone();
    let err = reconcile(&book, &mut current, DateOrder::DayFirst).unwrap_err();

    assert!(matches!(&err, PortalError::Import { sheet, cell, .. } if sheet == "Budget" && cell == "F2"));
    assert!(err.to_string().contains("Budget!F2"));
    assert_eq!(current, before);
    println!("✓ Error points at {}", err);
}

#[test]
fn bad_progress_is_reported_with_its_cell() {
    println!("Test 3: a non-numeric % complete aborts the import");
    let mut book = build_workbook(&sample());
    let mut plan = book.sheet(WORKPLAN_SHEET).unwrap().clone();
    plan.rows[2][8] = "half".into();
    replace_sheet(&mut book, plan);

    let mut current = Logframe::new();
    let err = reconcile(&book, &mut current, DateOrder::DayFirst).unwrap_err();
    assert!(err.to_string().contains("Workplan!I3"));
    assert!(current.is_empty());
    println!("✓ Error points at {}", err);
}

#[test]
fn extra_goals_and_outcomes_are_discarded() {
    println!("Test 4: only one goal and one outcome survive");
    let mut book = Workbook::new();
    book.add_sheet(summary(&[
        ("Goal", "First goal", ""),
        ("Goal", "Second goal", ""),
        ("Outcome", "Outcome A", "First goal"),
        ("Outcome", "Outcome B", "Second goal"),
        ("Output", "Output under B", "Outcome B"),
    ]));

    let mut lf = Logframe::new();
    let report = reconcile(&book, &mut lf, DateOrder::DayFirst).unwrap();

    assert_eq!(report.discarded_goals, 1);
    assert_eq!(report.discarded_outcomes, 1);
    assert_eq!(lf.goals.len(), 1);
    assert_eq!(lf.outcomes.len(), 1);
    assert_eq!(lf.outcomes[0].name, "Outcome A");
    assert_eq!(lf.outputs[0].parent_id.as_deref(), Some(lf.outcomes[0].id.as_str()));
    assert!(!report.identification_imported);
    println!("✓ Extra rows discarded, outputs re-parented");
}

#[test]
fn ambiguous_names_take_the_first_match() {
    println!("Test 5: duplicate output names are flagged");
    let mut book = Workbook::new();
    book.add_sheet(summary(&[
        ("Goal", "Goal", ""),
        ("Outcome", "Outcome", "Goal"),
        ("Output", "Training", "Outcome"),
        ("Output", "Training", "Outcome"),
    ]));
    let mut kpis = Sheet::new("KPI Matrix", &["Parent Level", "Parent (label)", "KPI"]);
    kpis.push_row(vec!["Output".into(), "Output 2 — Training".into(), "People trained".into()]);
    kpis.push_row(vec!["Output".into(), "Output 9 — Unknown".into(), "Orphan KPI".into()]);
    book.add_sheet(kpis);

    let mut lf = Logframe::new();
    let report = reconcile(&book, &mut lf, DateOrder::DayFirst).unwrap();

    assert_eq!(report.kpis, 1);
    assert_eq!(report.dropped_kpis, 1);
    assert_eq!(report.ambiguous.len(), 1);
    assert_eq!(report.ambiguous[0].sheet, "KPI Matrix");
    assert_eq!(report.ambiguous[0].row, 2);
    assert_eq!(report.ambiguous[0].candidates, 2);
    assert_eq!(lf.kpis[0].parent_id.as_deref(), Some(lf.outputs[0].id.as_str()));
    println!("✓ First candidate used and recorded");
}

#[test]
fn short_workplan_and_impact_level() {
    println!("Test 6: five-column workplan and the Impact level");
    let mut book = Workbook::new();
    book.add_sheet(summary(&[
        ("Impact", "Goal 1 — Resilient farms", ""),
        ("Outcome", "Higher yields", ""),
        ("Output", "Seed banks", ""),
    ]));
    let mut plan = Sheet::new(
        WORKPLAN_SHEET,
        &["Activity", "Responsible Person", "Start Date", "End Date", "Milestone"],
    );
    plan.push_row(vec![
        "Activity 1.1 — Collect seeds".into(),
        "Extension team".into(),
        "15/01/2025".into(),
        CellValue::Date(date(2025, 3, 31)),
        "Sampling | Storage".into(),
    ]);
    plan.push_row(vec![CellValue::Empty, "Nobody".into()]);
    book.add_sheet(plan);

    let mut lf = Logframe::new();
    lf.project.title = "Kept title".into();
    let report = reconcile(&book, &mut lf, DateOrder::DayFirst).unwrap();

    assert_eq!(lf.goals[0].name, "Resilient farms");
    assert_eq!(lf.outcomes[0].parent_id.as_deref(), Some(lf.goals[0].id.as_str()));
    assert_eq!(lf.outputs[0].parent_id.as_deref(), Some(lf.outcomes[0].id.as_str()));
    assert_eq!(report.activities, 1);
    assert_eq!(report.dropped_activities, 1);

    let activity = &lf.activities[0];
    assert_eq!(activity.name, "Collect seeds");
    assert_eq!(activity.owner, "Extension team");
    assert_eq!(activity.output_id.as_deref(), Some(lf.outputs[0].id.as_str()));
    assert_eq!(activity.start_date, Some(date(2025, 1, 15)));
    assert_eq!(activity.end_date, Some(date(2025, 3, 31)));
    assert_eq!(activity.milestones, vec!["Sampling", "Storage"]);
    assert_eq!(lf.project.title, "Kept title");
    println!("✓ Short layout read");
}

#[cfg(feature = "xlsx")]
#[test]
fn import_from_xlsx_bytes() {
    println!("Test 7: import an exported file");
    let bytes = grant_portal::export_xlsx(&sample()).unwrap();
    let mut lf = Logframe::new();
    let report = grant_portal::import_xlsx(&bytes, &mut lf, DateOrder::DayFirst).unwrap();
    assert_eq!(report.kpis, 2);
    assert_eq!(report.budget_lines, 2);
    assert_eq!(lf.activities.len(), 2);
    println!("✓ File imported");
}

#[test]
fn linked_kpi_names_may_contain_commas() {
    println!("Test 8: a comma inside a KPI name does not break the link");
    let mut lf = sample();
    let kitchens = lf.outputs[0].id.clone();
    let mut add = |name: &str| {
        lf.add_kpi(&KpiDraft {
            output_id: kitchens.clone(),
            name: name.into(),
            ..KpiDraft::default()
        })
        .unwrap()
    };
    add("Cost");
    let reduced = add("Cost, reduced");
    let waste = add("Waste");
    let meals = lf.kpis[0].id.clone();
    lf.add_activity(&ActivityDraft {
        output_id: Some(kitchens.clone()),
        name: "Audit suppliers".into(),
        owner: "Finance".into(),
        kpi_ids: vec![meals, reduced, waste],
        ..ActivityDraft::default()
    })
    .unwrap();

    let book = build_workbook(&lf);
    let mut imported = Logframe::new();
    let report = reconcile(&book, &mut imported, DateOrder::DayFirst).unwrap();
    assert!(report.ambiguous.is_empty());

    let audit = imported
        .activities
        .iter()
        .find(|a| a.name == "Audit suppliers")
        .unwrap();
    let linked: Vec<&str> = audit
        .kpi_ids
        .iter()
        .map(|id| imported.kpi(id).unwrap().name.as_str())
        .collect();
    assert_eq!(linked, vec!["Meals served per day", "Cost, reduced", "Waste"]);
    println!("✓ Links kept: {:?}", linked);
}
