use chrono::NaiveDate;
use grant_portal::portfolio::{PortfolioStore, ProjectInput, ProjectStatus};
use grant_portal::saving::{
    load_logframe, load_portfolio_or_default, save_logframe, save_portfolio,
};
use grant_portal::{BudgetDraft, KpiDraft, Logframe};
use tempfile::tempdir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn logframe_snapshot_round_trip() {
    println!("Test 1: save and reload a logframe");
    let dir = tempdir().unwrap();
    let path = dir.path().join("sessions").join("abc.bin.gz");

    let mut lf = Logframe::new();
    lf.project.title = "Snapshot".into();
    lf.project.start_date = Some(date(2025, 4, 1));
    let goal = lf.add_goal("Goal").unwrap();
    let outcome = lf.add_outcome("Outcome", &goal).unwrap();
    let output = lf.add_output("Output", "None", &outcome).unwrap();
    lf.add_kpi(&KpiDraft {
        output_id: output.clone(),
        name: "Indicator".into(),
        end_date: Some(date(2025, 12, 31)),
        ..KpiDraft::default()
    })
    .unwrap();
    lf.add_budget_line(&BudgetDraft {
        output_id: Some(output),
        item: "Travel".into(),
        quantity: 3.0,
        unit_cost: 99.99,
        ..BudgetDraft::default()
    })
    .unwrap();

    save_logframe(&lf, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let loaded = load_logframe(&path).unwrap();
    assert_eq!(loaded, lf);
    println!("✓ Snapshot identical after reload");
}

#[test]
fn portfolio_snapshot_round_trip() {
    println!("Test 2: save and reload the portfolio");
    let dir = tempdir().unwrap();
    let path = dir.path().join("portfolio.bin.gz");

    let missing = load_portfolio_or_default(&path).unwrap();
    assert_eq!(missing, PortfolioStore::default());

    let mut store = PortfolioStore::new();
    let first = store
        .create_project(
            &ProjectInput {
                title: "Solar".into(),
                description: String::new(),
                start_date: date(2025, 1, 1),
                end_date: date(2025, 6, 30),
                status: ProjectStatus::Planned,
                manager_user: "pm@example.org".into(),
                funder: "Green Fund".into(),
                overhead_rate: 0.2,
                notes: String::new(),
            },
            date(2025, 1, 1),
        )
        .unwrap();
    save_portfolio(&store, &path).unwrap();

    let mut loaded = load_portfolio_or_default(&path).unwrap();
    assert_eq!(loaded, store);

    // The id counter is part of the snapshot.
    loaded.delete_project(first).unwrap();
    let second = loaded
        .create_project(&ProjectInput::from(&store.projects[&first]), date(2025, 2, 1))
        .unwrap();
    assert!(second > first);
    println!("✓ Store and id counter restored");
}

#[test]
fn corrupt_snapshot_is_an_error() {
    println!("Test 3: unreadable snapshot");
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.bin.gz");
    std::fs::write(&path, b"not gzip").unwrap();
    assert!(load_logframe(&path).is_err());
    assert!(load_portfolio_or_default(&path).is_err());
    println!("✓ Error returned");
}
