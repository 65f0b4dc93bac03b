use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::criteria::{CriteriaDivergence, CriteriaSet, DivergenceImpact};
use crate::eligibility::{EvaluationRun, FeatureWarning, FeatureWarningKind};
use crate::report::{DashboardReport, FeatureDistribution};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_criteria_table(criteria: &CriteriaSet) -> String {
    let mut table = new_table();
    table.set_header(vec!["#", "Criterion", "Requirement"]);
    for (idx, criterion) in criteria.iter().enumerate() {
        table.add_row(vec![
            (idx + 1).to_string(),
            criterion.name.clone(),
            criterion.constraint.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_dashboard(report: &DashboardReport) -> String {
    let summary = &report.summary;
    let mut kpis = new_table();
    kpis.set_header(vec!["Total", "Eligible", "Ineligible", "Eligible rate"]);
    kpis.add_row(Row::from(vec![
        Cell::new(summary.total),
        Cell::new(summary.eligible_count).fg(Color::Green),
        Cell::new(summary.ineligible_count).fg(Color::Red),
        Cell::new(format!("{:.1}%", summary.eligible_rate * 100.0)),
    ]));

    let mut failures = new_table();
    failures.set_header(vec!["Condition", "Patients failing"]);
    for row in &report.failure_histogram {
        failures.add_row(vec![row.criterion_name.clone(), row.count.to_string()]);
    }

    let mut terminal = new_table();
    terminal.set_header(vec!["Rank", "Patient", "Failed", "Criteria"]);
    for (idx, case) in report.terminal_cases.iter().enumerate() {
        terminal.add_row(vec![
            (idx + 1).to_string(),
            case.patient_id.clone(),
            case.failed_count.to_string(),
            case.failed_criteria.join(", "),
        ]);
    }

    format!(
        "{kpis}\n\nFailure reasons\n{failures}\n\nTerminal cases\n{terminal}",
    )
}

pub fn render_results_table(run: &EvaluationRun) -> String {
    let mut table = new_table();
    table.set_header(vec!["Patient", "Eligible", "Failed criteria"]);
    for r in &run.results {
        let elig_cell = if r.eligible {
            Cell::new("YES").fg(Color::Green)
        } else {
            Cell::new("NO").fg(Color::Red)
        };
        table.add_row(Row::from(vec![
            Cell::new(&r.patient_id),
            elig_cell,
            Cell::new(if r.failed_criteria.is_empty() {
                "-".to_string()
            } else {
                r.failed_criteria.join(", ")
            }),
        ]));
    }
    table.to_string()
}

pub fn render_warnings_table(warnings: &[FeatureWarning]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Patient", "Criterion", "Problem"]);
    for warning in warnings {
        let problem = match warning.kind {
            FeatureWarningKind::MissingFeature => "missing value",
            FeatureWarningKind::NotNumeric => "not a number",
        };
        table.add_row(vec![
            warning.patient_id.clone(),
            warning.criterion_name.clone(),
            problem.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_divergence_table(divergences: &[CriteriaDivergence]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Criterion", "Field", "Extracted", "Edited"]);
    for divergence in divergences {
        for change in &divergence.changes {
            table.add_row(vec![
                divergence.criterion_name.clone(),
                change.field.to_string(),
                change.before.clone().unwrap_or_else(|| "-".to_string()),
                change.after.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
    }
    table.to_string()
}

pub fn render_impact(impact: &DivergenceImpact) -> String {
    format!(
        "Now eligible: {:?}\nNow ineligible: {:?}\nUnchanged: {}",
        impact.now_eligible, impact.now_ineligible, impact.unchanged
    )
}

pub fn render_distribution_table(distribution: &FeatureDistribution) -> String {
    let mut table = new_table();
    table.set_header(vec![
        distribution.feature.as_str(),
        "Eligible",
        "Ineligible",
        "Total",
    ]);
    for bucket in &distribution.buckets {
        table.add_row(vec![
            bucket.label.clone(),
            bucket.eligible.to_string(),
            bucket.ineligible.to_string(),
            bucket.total().to_string(),
        ]);
    }
    let mut out = table.to_string();
    if distribution.missing > 0 {
        out.push_str(&format!("\nMissing values: {}", distribution.missing));
    }
    out
}
