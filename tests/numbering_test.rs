use grant_portal::numbering::display_label;
use grant_portal::{ActivityDraft, KpiDraft, Logframe, NodeKind, compute_numbers};

#[test]
fn numbers_restart_per_outcome() {
    println!("Test 1: output numbers restart under each outcome");
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Goal").unwrap();
    let first = lf.add_outcome("First outcome", &goal).unwrap();
    let second = lf.add_outcome("Second outcome", &goal).unwrap();

    let a = lf.add_output("A", "", &first).unwrap();
    let b = lf.add_output("B", "", &first).unwrap();
    let c = lf.add_output("C", "", &second).unwrap();

    let kpi_b1 = lf
        .add_kpi(&KpiDraft {
            output_id: b.clone(),
            name: "B one".into(),
            ..KpiDraft::default()
        })
        .unwrap();
    let kpi_b2 = lf
        .add_kpi(&KpiDraft {
            output_id: b.clone(),
            name: "B two".into(),
            ..KpiDraft::default()
        })
        .unwrap();

    let numbering = compute_numbers(&lf, false);
    assert_eq!(numbering.output(&a), Some("1"));
    assert_eq!(numbering.output(&b), Some("2"));
    assert_eq!(numbering.output(&c), Some("1"));
    assert_eq!(numbering.kpi(&kpi_b1), Some("2.1"));
    assert_eq!(numbering.kpi(&kpi_b2), Some("2.2"));
    assert!(numbering.activities.is_none());
    println!("✓ Outputs 1, 2 then 1 again; KPIs 2.1, 2.2");
}

#[test]
fn activities_are_numbered_only_on_request() {
    println!("Test 2: activity numbering is optional");
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Goal").unwrap();
    let outcome = lf.add_outcome("Outcome", &goal).unwrap();
    let output = lf.add_output("Output", "", &outcome).unwrap();
    let first = lf
        .add_activity(&ActivityDraft {
            output_id: Some(output.clone()),
            name: "Survey".into(),
            owner: "Team".into(),
            ..ActivityDraft::default()
        })
        .unwrap();
    let unassigned = lf
        .add_activity(&ActivityDraft {
            name: "Coordination".into(),
            owner: "PMU".into(),
            ..ActivityDraft::default()
        })
        .unwrap();

    let numbering = compute_numbers(&lf, true);
    assert_eq!(numbering.activity(&first), Some("1.1"));
    assert_eq!(numbering.activity(&unassigned), None);
    assert_eq!(
        display_label(NodeKind::Activity, numbering.activity(&unassigned), "Coordination"),
        "Activity — Coordination"
    );
    println!("✓ Unassigned activity left unnumbered");
}

#[test]
fn orphaned_outputs_are_not_numbered() {
    println!("Test 3: an output whose outcome is gone has no number");
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Goal").unwrap();
    let outcome = lf.add_outcome("Outcome", &goal).unwrap();
    let output = lf.add_output("Output", "", &outcome).unwrap();
    lf.outcomes.clear();

    let numbering = compute_numbers(&lf, false);
    assert_eq!(numbering.output(&output), None);
    assert_eq!(lf.dangling_references().len(), 1);
    println!("✓ Orphan skipped");
}

fn kpi(lf: &mut Logframe, output: &str, name: &str) -> String {
    lf.add_kpi(&KpiDraft {
        output_id: output.to_string(),
        name: name.into(),
        ..KpiDraft::default()
    })
    .unwrap()
}

#[test]
fn numbers_hold_when_later_siblings_are_added() {
    println!("Test 4: appending under the same outcome keeps existing numbers");
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Goal").unwrap();
    let outcome = lf.add_outcome("Outcome", &goal).unwrap();
    let first = lf.add_output("First", "", &outcome).unwrap();
    let second = lf.add_output("Second", "", &outcome).unwrap();
    let watched = kpi(&mut lf, &second, "Watched");

    let before = compute_numbers(&lf, false);
    assert_eq!(before.kpi(&watched), Some("2.1"));

    let third = lf.add_output("Third", "", &outcome).unwrap();
    kpi(&mut lf, &first, "New on first");
    kpi(&mut lf, &second, "New on second");
    kpi(&mut lf, &third, "New on third");

    let after = compute_numbers(&lf, false);
    assert_eq!(after.output(&first), Some("1"));
    assert_eq!(after.output(&second), Some("2"));
    assert_eq!(after.output(&third), Some("3"));
    assert_eq!(after.kpi(&watched), before.kpi(&watched));
    println!("✓ KPI 2.1 unchanged");
}

#[test]
fn numbers_ignore_other_outcomes() {
    println!("Test 5: inserting under a different outcome keeps existing numbers");
    let mut lf = Logframe::new();
    let goal = lf.add_goal("Goal").unwrap();
    let first = lf.add_outcome("First outcome", &goal).unwrap();
    let output = lf.add_output("Output", "", &first).unwrap();
    let watched = kpi(&mut lf, &output, "Watched");
    let before = compute_numbers(&lf, false);

    let second = lf.add_outcome("Second outcome", &goal).unwrap();
    let elsewhere = lf.add_output("Elsewhere", "", &second).unwrap();
    let other = kpi(&mut lf, &elsewhere, "Other");

    let after = compute_numbers(&lf, false);
    assert_eq!(after.output(&output), Some("1"));
    assert_eq!(after.kpi(&watched), before.kpi(&watched));
    assert_eq!(after.kpi(&watched), Some("1.1"));
    assert_eq!(after.output(&elsewhere), Some("1"));
    assert_eq!(after.kpi(&other), Some("1.1"));
    println!("✓ Numbers independent across outcomes");
}
