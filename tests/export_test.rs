use grant_portal::export::{
    BUDGET_COLUMNS, BUDGET_SHEET, FIELD_FUNDING, FIELD_KPIS, IDENTIFICATION_SHEET, KPI_COLUMNS,
    KPI_SHEET, SUMMARY_SHEET, WORKPLAN_COLUMNS, WORKPLAN_SHEET,
};
use grant_portal::{
    ActivityDraft, BudgetDraft, CellValue, KpiDraft, Logframe, build_document, build_workbook,
};

fn sample() -> Logframe {
    let mut lf = Logframe::new();
    lf.project.title = "Clean Water".into();
    let goal = lf.add_goal("Safe water for all").unwrap();
    let outcome = lf.add_outcome("Households use treated water", &goal).unwrap();
    let wells = lf.add_output("Wells drilled", "Permits granted", &outcome).unwrap();
    let _training = lf.add_output("Committees trained", "", &outcome).unwrap();

    let depth = lf
        .add_kpi(&KpiDraft {
            output_id: wells.clone(),
            name: "Wells in use".into(),
            target: "12".into(),
            mov: "Inspection report".into(),
            linked_payment: true,
            ..KpiDraft::default()
        })
        .unwrap();
    lf.add_kpi(&KpiDraft {
        output_id: wells.clone(),
        name: "Water quality tests passed".into(),
        mov: "Lab results".into(),
        ..KpiDraft::default()
    })
    .unwrap();

    lf.add_activity(&ActivityDraft {
        output_id: Some(wells.clone()),
        name: "Drill wells".into(),
        owner: "Contractor".into(),
        kpi_ids: vec![depth],
        milestones: vec!["Site survey".into(), "First well".into()],
        progress: 25,
        ..ActivityDraft::default()
    })
    .unwrap();
    lf.add_budget_line(&BudgetDraft {
        output_id: Some(wells),
        item: "Drilling rig".into(),
        quantity: 2.0,
        unit_cost: 617283.5,
        ..BudgetDraft::default()
    })
    .unwrap();
    lf
}

fn header(book: &grant_portal::Workbook, name: &str) -> Vec<String> {
    book.sheet(name).unwrap().rows[0]
        .iter()
        .map(CellValue::as_text)
        .collect()
}

#[test]
fn sheets_and_columns() {
    println!("Test 1: workbook layout");
    let book = build_workbook(&sample());
    assert_eq!(
        book.sheet_names(),
        vec![IDENTIFICATION_SHEET, SUMMARY_SHEET, KPI_SHEET, WORKPLAN_SHEET, BUDGET_SHEET]
    );
    assert_eq!(header(&book, KPI_SHEET), KPI_COLUMNS.to_vec());
    assert_eq!(header(&book, WORKPLAN_SHEET), WORKPLAN_COLUMNS.to_vec());
    assert_eq!(header(&book, BUDGET_SHEET), BUDGET_COLUMNS.to_vec());
    println!("✓ Five sheets with fixed headers");
}

#[test]
fn summary_and_kpi_rows() {
    println!("Test 2: summary parents and KPI labels");
    let book = build_workbook(&sample());

    let summary = book.sheet(SUMMARY_SHEET).unwrap();
    assert_eq!(summary.data_len(), 4);
    let outcome_row = &summary.rows[2];
    assert_eq!(outcome_row[0].as_text(), "Outcome");
    assert_eq!(outcome_row[2].as_text(), "Safe water for all");
    assert_eq!(summary.rows[3][3].as_text(), "Permits granted");

    let kpis = book.sheet(KPI_SHEET).unwrap();
    assert_eq!(kpis.data_len(), 2);
    assert_eq!(kpis.rows[1][1].as_text(), "Output 1 — Wells drilled");
    assert_eq!(kpis.rows[1][7].as_text(), "Yes");
    assert_eq!(kpis.rows[2][7].as_text(), "No");
    println!("✓ Parents by name, outputs labelled");
}

#[test]
fn workplan_and_budget_rows() {
    println!("Test 3: workplan and budget");
    let book = build_workbook(&sample());

    let plan = book.sheet(WORKPLAN_SHEET).unwrap();
    let row = &plan.rows[1];
    assert_eq!(row[1].as_text(), "1.1");
    assert_eq!(row[2].as_text(), "Wells drilled");
    assert_eq!(row[8], CellValue::Number(25.0));
    assert_eq!(row[9].as_text(), "Wells in use");
    assert_eq!(row[10].as_text(), "Site survey | First well");

    let budget = book.sheet(BUDGET_SHEET).unwrap();
    assert_eq!(budget.number_format.as_deref(), Some("0.00"));
    assert_eq!(budget.rows[1][8], CellValue::Number(1234567.0));

    let identification = book.sheet(IDENTIFICATION_SHEET).unwrap();
    let value_of = |field: &str| {
        identification
            .rows
            .iter()
            .find(|r| r[0].as_text() == field)
            .map(|r| r[1].as_text())
            .unwrap()
    };
    assert_eq!(value_of(FIELD_FUNDING), "1.234.567,00");
    assert_eq!(value_of(FIELD_KPIS), "2");
    println!("✓ Rows rendered");
}

#[test]
fn document_groups() {
    println!("Test 4: document export merges output cells");
    let document = build_document(&sample());
    assert_eq!(document.goal, "Safe water for all");
    assert_eq!(document.outcome, "Households use treated water");
    assert_eq!(document.groups.len(), 2);
    assert_eq!(document.groups[0].rowspan(), 2);
    assert_eq!(document.groups[0].rows[1].kpi, "KPI 1.2 — Water quality tests passed");
    assert_eq!(document.groups[1].output, "Output 2 — Committees trained");
    assert_eq!(document.groups[1].rowspan(), 1);
    println!("✓ Groups built");
}

#[cfg(feature = "docs")]
#[test]
fn document_html() {
    println!("Test 5: HTML rendering");
    let html = grant_portal::render_document_html(&build_document(&sample())).unwrap();
    assert!(html.contains("<h1>Clean Water</h1>"));
    assert!(html.contains(r#"rowspan="2""#));
    assert!(html.contains("Inspection report"));
    assert!(html.contains("Permits granted"));
    println!("✓ HTML rendered");
}

#[cfg(feature = "xlsx")]
#[test]
fn xlsx_bytes_read_back() {
    println!("Test 6: xlsx write and read");
    let bytes = grant_portal::export_xlsx(&sample()).unwrap();
    let book = grant_portal::loader::from_xlsx_bytes(&bytes).unwrap();
    let summary = book.sheet(SUMMARY_SHEET).unwrap();
    assert_eq!(summary.rows[1][1].as_text(), "Safe water for all");
    println!("✓ Workbook readable");
}
