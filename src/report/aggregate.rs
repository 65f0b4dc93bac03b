use std::collections::BTreeMap;

use chrono::Utc;

use crate::eligibility::{EvaluationResult, EvaluationRun};
use crate::error::{ScreeningError, ScreeningResult};
use crate::report::{DashboardReport, FailureCount, Summary, TerminalCase};

/// Recomputes every dashboard aggregate from `run`.
pub fn build_dashboard(run: &EvaluationRun, terminal_limit: usize) -> ScreeningResult<DashboardReport> {
    Ok(DashboardReport {
        generated_at: Utc::now(),
        summary: summarize(&run.results)?,
        failure_histogram: failure_histogram(&run.results, &run.criteria_order),
        terminal_cases: terminal_cases(&run.results, terminal_limit),
    })
}

pub fn summarize(results: &[EvaluationResult]) -> ScreeningResult<Summary> {
    let total = results.len();
    if total == 0 {
        return Err(ScreeningError::EmptyDataset);
    }
    let eligible_count = results.iter().filter(|r| r.eligible).count();
    Ok(Summary {
        total,
        eligible_count,
        ineligible_count: total - eligible_count,
        eligible_rate: eligible_count as f64 / total as f64,
    })
}

/// Counts how often each criterion caused a failure. Sorted by count descending, ties by
/// the criterion's position in `criteria_order`; names missing from that order go last,
/// alphabetically.
pub fn failure_histogram(results: &[EvaluationResult], criteria_order: &[String]) -> Vec<FailureCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for result in results.iter().filter(|r| !r.eligible) {
        for name in &result.failed_criteria {
            *counts.entry(name.as_str()).or_default() += 1;
        }
    }

    let position = |name: &str| {
        criteria_order
            .iter()
            .position(|c| c == name)
            .unwrap_or(usize::MAX)
    };
    let mut histogram = counts
        .into_iter()
        .map(|(name, count)| FailureCount {
            criterion_name: name.to_string(),
            count,
        })
        .collect::<Vec<_>>();
    histogram.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| {
                position(a.criterion_name.as_str()).cmp(&position(b.criterion_name.as_str()))
            })
            .then_with(|| a.criterion_name.cmp(&b.criterion_name))
    });
    histogram
}

/// Ineligible patients ranked by how many criteria they fail, ties by patient id.
pub fn terminal_cases(results: &[EvaluationResult], limit: usize) -> Vec<TerminalCase> {
    let mut cases = results
        .iter()
        .filter(|r| !r.eligible)
        .map(|r| TerminalCase {
            patient_id: r.patient_id.clone(),
            failed_count: r.failed_count(),
            failed_criteria: r.failed_criteria.clone(),
        })
        .collect::<Vec<_>>();
    cases.sort_by(|a, b| {
        b.failed_count
            .cmp(&a.failed_count)
            .then_with(|| a.patient_id.cmp(&b.patient_id))
    });
    cases.truncate(limit);
    cases
}
