pub mod evaluator;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationResult {
    pub patient_id: String,
    pub eligible: bool,
    pub failed_criteria: Vec<String>,
}

impl EvaluationResult {
    pub fn failed_count(&self) -> usize {
        self.failed_criteria.len()
    }
}

/// Non-fatal annotation raised while evaluating one patient against one criterion. The
/// criterion is counted as failed and evaluation carries on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureWarning {
    pub patient_id: String,
    pub criterion_name: String,
    pub kind: FeatureWarningKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureWarningKind {
    /// The patient has no value for the criterion's feature.
    MissingFeature,
    /// A range criterion met a text value that does not parse as a number.
    NotNumeric,
}

/// Output of one evaluation pass: one result per patient in input order, the criteria
/// order the results were produced under, and every warning raised on the way.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRun {
    pub criteria_order: Vec<String>,
    pub results: Vec<EvaluationResult>,
    pub warnings: Vec<FeatureWarning>,
}

impl EvaluationRun {
    pub fn eligible(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.results.iter().filter(|r| r.eligible)
    }

    pub fn ineligible(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.results.iter().filter(|r| !r.eligible)
    }

    pub fn result_for(&self, patient_id: &str) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.patient_id == patient_id)
    }
}
