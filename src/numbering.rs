//! Dotted display numbers for Outputs, KPIs and Activities.
//!
//! Numbers are a view: they are recomputed for every render or export and
//! never stored on the entities. Outputs are numbered per Outcome, KPIs and
//! Activities per Output, always in stored order.

use serde::Serialize;
use std::collections::HashMap;

use crate::logframe::Logframe;
use crate::model::NodeKind;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Numbering {
    pub outputs: HashMap<String, String>,
    pub kpis: HashMap<String, String>,
    /// Only filled when activities were requested.
    pub activities: Option<HashMap<String, String>>,
}

impl Numbering {
    pub fn output(&self, id: &str) -> Option<&str> {
        self.outputs.get(id).map(String::as_str)
    }

    pub fn kpi(&self, id: &str) -> Option<&str> {
        self.kpis.get(id).map(String::as_str)
    }

    pub fn activity(&self, id: &str) -> Option<&str> {
        self.activities
            .as_ref()
            .and_then(|a| a.get(id))
            .map(String::as_str)
    }
}

pub fn compute_numbers(logframe: &Logframe, include_activities: bool) -> Numbering {
    let mut numbering = Numbering {
        activities: include_activities.then(HashMap::new),
        ..Numbering::default()
    };

    for outcome in &logframe.outcomes {
        for (i, output) in logframe.outputs_of(&outcome.id).enumerate() {
            let number = (i + 1).to_string();

            for (p, kpi) in logframe.kpis_of(&output.id).enumerate() {
                numbering
                    .kpis
                    .insert(kpi.id.clone(), format!("{}.{}", number, p + 1));
            }
            if let Some(activities) = numbering.activities.as_mut() {
                for (q, activity) in logframe.activities_of(&output.id).enumerate() {
                    activities.insert(activity.id.clone(), format!("{}.{}", number, q + 1));
                }
            }

            numbering.outputs.insert(output.id.clone(), number);
        }
    }

    numbering
}

/// `"KPI 1.2 — Reduce cost"`, or `"KPI — Reduce cost"` when unnumbered.
pub fn display_label(kind: NodeKind, number: Option<&str>, name: &str) -> String {
    match number {
        Some(n) => format!("{} {} — {}", kind.label(), n, name),
        None => format!("{} — {}", kind.label(), name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(
            display_label(NodeKind::Kpi, Some("1.2"), "Reduce cost"),
            "KPI 1.2 — Reduce cost"
        );
        assert_eq!(
            display_label(NodeKind::Output, None, "Clinics"),
            "Output — Clinics"
        );
    }
}
