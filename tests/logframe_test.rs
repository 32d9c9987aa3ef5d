use chrono::NaiveDate;
use grant_portal::{
    ActivityDraft, ActivityStatus, BudgetDraft, KpiDraft, Logframe, NodeRef, PortalError,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Tree {
    lf: Logframe,
    outcome: String,
    out1: String,
    out2: String,
    kpi1: String,
    kpi2: String,
}

fn tree() -> Tree {
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Healthier communities").unwrap();
    let outcome = lf.add_outcome("Better access to clinics", &goal).unwrap();
    let out1 = lf.add_output("Clinics built", "Land is available", &outcome).unwrap();
    let out2 = lf.add_output("Staff trained", "", &outcome).unwrap();
    let kpi1 = lf
        .add_kpi(&KpiDraft {
            output_id: out1.clone(),
            name: "Clinics operating".into(),
            baseline: "0".into(),
            target: "4".into(),
            mov: "Site visit".into(),
            ..KpiDraft::default()
        })
        .unwrap();
    let kpi2 = lf
        .add_kpi(&KpiDraft {
            output_id: out2.clone(),
            name: "Nurses certified".into(),
            ..KpiDraft::default()
        })
        .unwrap();
    Tree {
        lf,
        outcome,
        out1,
        out2,
        kpi1,
        kpi2,
    }
}

#[test]
fn names_are_stored_without_display_labels() {
    println!("Test 1: label prefixes are stripped on create");
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Goal 1 — Healthier communities").unwrap();
    assert_eq!(lf.goal(&goal).unwrap().name, "Healthier communities");

    let outcome = lf.add_outcome("  Outcome: Access ", &goal).unwrap();
    let output = lf.add_output("Output 2.1 – Clinics", "", &outcome);
    // "Outcome:" has no number, so it is not a display label.
    assert_eq!(lf.outcome(&outcome).unwrap().name, "Outcome: Access");
    assert_eq!(lf.output(&output.unwrap()).unwrap().name, "Clinics");
    println!("✓ Display labels stripped");
}

#[test]
fn invalid_forms_change_nothing() {
    println!("Test 2: validation failures leave the store untouched");
    let mut t = tree();
    let before = t.lf.clone();

    assert!(matches!(t.lf.add_goal("   "), Err(PortalError::Validation { .. })));
    assert!(matches!(
        t.lf.add_outcome("Orphan", "missing"),
        Err(PortalError::NotFound { .. })
    ));
    assert!(matches!(
        t.lf.add_kpi(&KpiDraft {
            output_id: t.out1.clone(),
            name: "Backwards".into(),
            start_date: Some(date(2025, 6, 1)),
            end_date: Some(date(2025, 1, 1)),
            ..KpiDraft::default()
        }),
        Err(PortalError::Validation { .. })
    ));
    assert!(matches!(
        t.lf.add_activity(&ActivityDraft {
            name: "No owner".into(),
            ..ActivityDraft::default()
        }),
        Err(PortalError::Validation { .. })
    ));
    assert!(matches!(
        t.lf.add_budget_line(&BudgetDraft {
            item: "Laptops".into(),
            quantity: -1.0,
            unit_cost: 10.0,
            ..BudgetDraft::default()
        }),
        Err(PortalError::Validation { .. })
    ));
    assert_eq!(t.lf, before);
    println!("✓ Store unchanged after rejected forms");
}

#[test]
fn activity_links_must_be_consistent() {
    println!("Test 3: activity KPI links stay under the activity's output");
    let mut t = tree();

    let wrong = t.lf.add_activity(&ActivityDraft {
        output_id: Some(t.out1.clone()),
        name: "Hire nurses".into(),
        owner: "HR".into(),
        kpi_ids: vec![t.kpi2.clone()],
        ..ActivityDraft::default()
    });
    assert!(matches!(wrong, Err(PortalError::Validation { field, .. }) if field == "kpi_ids"));

    let first = t
        .lf
        .add_activity(&ActivityDraft {
            output_id: Some(t.out1.clone()),
            name: "Build clinic".into(),
            owner: "Works".into(),
            kpi_ids: vec![t.kpi1.clone()],
            status: ActivityStatus::InProgress,
            progress: 40,
            ..ActivityDraft::default()
        })
        .unwrap();
    let second = t
        .lf
        .add_activity(&ActivityDraft {
            output_id: Some(t.out1.clone()),
            name: "Equip clinic".into(),
            owner: "Works".into(),
            dependencies: vec![first.clone()],
            ..ActivityDraft::default()
        })
        .unwrap();
    assert_eq!(t.lf.activity(&second).unwrap().dependencies, vec![first.clone()]);

    let too_far = t.lf.update_activity(
        &second,
        &ActivityDraft {
            name: "Equip clinic".into(),
            owner: "Works".into(),
            progress: 101,
            ..ActivityDraft::default()
        },
    );
    assert!(too_far.is_err());

    t.lf.remove_activity(&first).unwrap();
    assert!(t.lf.activity(&second).unwrap().dependencies.is_empty());
    println!("✓ Links validated and pruned");
}

#[test]
fn budget_totals_follow_every_write() {
    println!("Test 4: budget totals are recomputed");
    let mut t = tree();
    let line = t
        .lf
        .add_budget_line(&BudgetDraft {
            output_id: Some(t.out1.clone()),
            item: "Bricks".into(),
            quantity: 1000.0,
            unit_cost: 0.5,
            currency: "EUR".into(),
            ..BudgetDraft::default()
        })
        .unwrap();
    assert_eq!(t.lf.budget_line(&line).unwrap().total, 500.0);

    t.lf.update_budget_line(
        &line,
        &BudgetDraft {
            output_id: Some(t.out1.clone()),
            item: "Bricks".into(),
            quantity: 1200.0,
            unit_cost: 0.5,
            ..BudgetDraft::default()
        },
    )
    .unwrap();
    assert_eq!(t.lf.budget_line(&line).unwrap().total, 600.0);
    assert_eq!(t.lf.funding_total(), 600.0);
    println!("✓ Totals recomputed on create and edit");
}

#[test]
fn deleting_an_output_cascades() {
    println!("Test 5: output delete removes KPIs, activities and budget lines");
    let mut t = tree();
    let act = t
        .lf
        .add_activity(&ActivityDraft {
            output_id: Some(t.out1.clone()),
            name: "Build clinic".into(),
            owner: "Works".into(),
            kpi_ids: vec![t.kpi1.clone()],
            ..ActivityDraft::default()
        })
        .unwrap();
    t.lf.add_budget_line(&BudgetDraft {
        output_id: Some(t.out1.clone()),
        item: "Bricks".into(),
        quantity: 1.0,
        unit_cost: 1.0,
        ..BudgetDraft::default()
    })
    .unwrap();

    let report = t.lf.delete(&NodeRef::Output(t.out1.clone())).unwrap();
    assert_eq!(report.outputs, 1);
    assert_eq!(report.kpis, 1);
    assert_eq!(report.activities, 1);
    assert_eq!(report.budget_lines, 1);
    assert!(t.lf.activity(&act).is_none());
    assert!(t.lf.kpi(&t.kpi1).is_none());
    assert!(t.lf.kpi(&t.kpi2).is_some());
    assert!(t.lf.dangling_references().is_empty());
    println!("✓ Cascade removed {} records", report.total());
}

#[test]
fn deleting_a_goal_removes_the_whole_tree() {
    println!("Test 6: goal delete is recursive");
    let mut t = tree();
    let goal = t.lf.goals[0].id.clone();
    let report = t.lf.delete(&NodeRef::Goal(goal)).unwrap();
    assert_eq!(report.goals, 1);
    assert_eq!(report.outcomes, 1);
    assert_eq!(report.outputs, 2);
    assert_eq!(report.kpis, 2);
    assert!(t.lf.is_empty());

    let missing = t.lf.delete(&NodeRef::Outcome(t.outcome.clone()));
    assert!(matches!(missing, Err(PortalError::NotFound { .. })));
    println!("✓ Whole tree removed");
}

#[test]
fn moving_a_kpi_unlinks_foreign_activities() {
    println!("Test 7: re-parenting a KPI drops links from other outputs");
    let mut t = tree();
    let act = t
        .lf
        .add_activity(&ActivityDraft {
            output_id: Some(t.out1.clone()),
            name: "Build clinic".into(),
            owner: "Works".into(),
            kpi_ids: vec![t.kpi1.clone()],
            ..ActivityDraft::default()
        })
        .unwrap();
    t.lf.update_kpi(
        &t.kpi1,
        &KpiDraft {
            output_id: t.out2.clone(),
            name: "Clinics operating".into(),
            ..KpiDraft::default()
        },
    )
    .unwrap();
    assert!(t.lf.activity(&act).unwrap().kpi_ids.is_empty());
    println!("✓ Stale link removed");
}
