use anyhow::Result;

use crate::eligibility::EvaluationRun;
use crate::patients::Dataset;
use crate::report::{FailureCount, TerminalCase};

/// One row per eligible patient: `patient_id` followed by every feature column in the
/// dataset, sorted by name. Features a patient lacks are left blank.
pub fn eligible_to_csv(dataset: &Dataset, run: &EvaluationRun) -> Result<String> {
    let columns = dataset.feature_names();
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(std::iter::once("patient_id").chain(columns.iter().map(String::as_str)))?;
    for result in run.eligible() {
        let Some(patient) = dataset.get(&result.patient_id) else {
            continue;
        };
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(patient.patient_id.clone());
        for column in &columns {
            row.push(
                patient
                    .feature(column)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&row)?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn failures_to_csv(histogram: &[FailureCount]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["condition", "count"])?;
    for row in histogram {
        writer.write_record([row.criterion_name.clone(), row.count.to_string()])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn results_to_csv(run: &EvaluationRun) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["patient_id", "eligible", "failed_count", "failed_criteria"])?;
    for result in &run.results {
        writer.write_record([
            result.patient_id.clone(),
            result.eligible.to_string(),
            result.failed_count().to_string(),
            result.failed_criteria.join(";"),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn terminal_cases_to_csv(cases: &[TerminalCase]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["patient_id", "failed_count", "failed_criteria"])?;
    for case in cases {
        writer.write_record([
            case.patient_id.clone(),
            case.failed_count.to_string(),
            case.failed_criteria.join(";"),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
