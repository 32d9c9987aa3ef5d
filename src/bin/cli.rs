#![cfg(not(tarpaulin_include))]

use grant_portal::export::{build_document, render_document_html};
use grant_portal::loader::load_workbook;
use grant_portal::numbering::{compute_numbers, display_label};
use grant_portal::{DateOrder, ImportReport, Logframe, NodeKind, PortalConfig, reconcile};
use std::env;
use std::time::Instant;

fn usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} outline <file.xlsx>            Print the numbered logframe", program);
    eprintln!("  {} document <file.xlsx> <out.html> Render the logframe document", program);
    eprintln!("  {} check <file.xlsx>              Print the import report", program);
}

fn load(path: &str, order: DateOrder) -> Result<(Logframe, ImportReport), Box<dyn std::error::Error>> {
    let book = load_workbook(path)?;
    let mut logframe = Logframe::new();
    let report = reconcile(&book, &mut logframe, order)?;
    Ok((logframe, report))
}

fn print_outline(logframe: &Logframe) {
    let numbering = compute_numbers(logframe, true);

    if !logframe.project.title.is_empty() {
        println!("{}", logframe.project.title);
        println!();
    }
    for goal in &logframe.goals {
        println!("{}", display_label(NodeKind::Goal, None, &goal.name));
    }
    for outcome in &logframe.outcomes {
        println!("  {}", display_label(NodeKind::Outcome, None, &outcome.name));
        for output in logframe.outputs_of(&outcome.id) {
            println!(
                "    {}",
                display_label(NodeKind::Output, numbering.output(&output.id), &output.name)
            );
            for kpi in logframe.kpis_of(&output.id) {
                println!(
                    "      {}",
                    display_label(NodeKind::Kpi, numbering.kpi(&kpi.id), &kpi.name)
                );
            }
            for activity in logframe.activities_of(&output.id) {
                println!(
                    "      {}",
                    display_label(
                        NodeKind::Activity,
                        numbering.activity(&activity.id),
                        &activity.name
                    )
                );
            }
        }
    }
    println!();
    println!(
        "Budget: {} line(s), total {}",
        logframe.budget.len(),
        grant_portal::format::fmt_amount(logframe.funding_total())
    );
}

fn print_report(report: &ImportReport) {
    println!("Goals:        {}", report.goals);
    println!("Outcomes:     {}", report.outcomes);
    println!("Outputs:      {}", report.outputs);
    println!("KPIs:         {} ({} dropped)", report.kpis, report.dropped_kpis);
    println!(
        "Activities:   {} ({} dropped)",
        report.activities, report.dropped_activities
    );
    println!(
        "Budget lines: {} ({} dropped)",
        report.budget_lines, report.dropped_budget_lines
    );
    if report.discarded_goals > 0 || report.discarded_outcomes > 0 {
        println!(
            "Discarded {} extra goal(s) and {} extra outcome(s)",
            report.discarded_goals, report.discarded_outcomes
        );
    }
    for ambiguous in &report.ambiguous {
        println!(
            "Ambiguous: {} row {} '{}' matched {} items",
            ambiguous.sheet, ambiguous.row, ambiguous.name, ambiguous.candidates
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let s = Instant::now();
    let args: Vec<String> = env::args().collect();
    let order = PortalConfig::from_env()?.date_order;

    match (args.get(1).map(String::as_str), args.len()) {
        (Some("outline"), 3) => {
            let (logframe, _) = load(&args[2], order)?;
            print_outline(&logframe);
        }
        (Some("document"), 4) => {
            let (logframe, _) = load(&args[2], order)?;
            let html = render_document_html(&build_document(&logframe))?;
            std::fs::write(&args[3], html)?;
            println!("Wrote {}", args[3]);
        }
        (Some("check"), 3) => {
            let (logframe, report) = load(&args[2], order)?;
            print_report(&report);
            for dangling in logframe.dangling_references() {
                println!(
                    "Dangling: {} {} -> {}",
                    dangling.kind, dangling.id, dangling.missing
                );
            }
        }
        _ => {
            usage(args.first().map(String::as_str).unwrap_or("logframe-cli"));
            return Ok(());
        }
    }

    let e = s.elapsed().as_secs_f64();
    println!("Total elapsed time: {:.1} seconds", e);

    Ok(())
}
