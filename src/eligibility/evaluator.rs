use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::criteria::{format_number, Constraint, CriteriaSet, Criterion, FeatureValue};
use crate::eligibility::{EvaluationResult, EvaluationRun, FeatureWarning, FeatureWarningKind};
use crate::patients::PatientRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchPolicy {
    pub case_sensitive: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionOutcome {
    Passed,
    Failed,
    /// Failed, and the caller should record a warning of this kind.
    FailedWithWarning(FeatureWarningKind),
}

impl CriterionOutcome {
    pub fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Evaluates every patient against `criteria`. Results keep the input order and each
/// `failed_criteria` list follows the criteria set's order.
pub fn evaluate(
    patients: &[PatientRecord],
    criteria: &CriteriaSet,
    policy: MatchPolicy,
) -> EvaluationRun {
    let mut warnings = Vec::new();
    let results = patients
        .iter()
        .map(|patient| evaluate_patient(patient, criteria, policy, &mut warnings))
        .collect::<Vec<_>>();

    let eligible = results.iter().filter(|r| r.eligible).count();
    info!(
        patients = results.len(),
        eligible,
        warnings = warnings.len(),
        "evaluated dataset"
    );

    EvaluationRun {
        criteria_order: criteria.names(),
        results,
        warnings,
    }
}

pub fn evaluate_patient(
    patient: &PatientRecord,
    criteria: &CriteriaSet,
    policy: MatchPolicy,
    warnings: &mut Vec<FeatureWarning>,
) -> EvaluationResult {
    let mut failed_criteria = Vec::new();
    for criterion in criteria {
        let outcome = evaluate_criterion(patient.feature(&criterion.name), criterion, policy);
        if let CriterionOutcome::FailedWithWarning(kind) = outcome {
            debug!(
                patient = %patient.patient_id,
                criterion = %criterion.name,
                ?kind,
                "criterion could not be checked"
            );
            warnings.push(FeatureWarning {
                patient_id: patient.patient_id.clone(),
                criterion_name: criterion.name.clone(),
                kind,
            });
        }
        if !outcome.passed() {
            failed_criteria.push(criterion.name.clone());
        }
    }

    EvaluationResult {
        patient_id: patient.patient_id.clone(),
        eligible: failed_criteria.is_empty(),
        failed_criteria,
    }
}

pub fn evaluate_criterion(
    value: Option<&FeatureValue>,
    criterion: &Criterion,
    policy: MatchPolicy,
) -> CriterionOutcome {
    let Some(value) = value else {
        return CriterionOutcome::FailedWithWarning(FeatureWarningKind::MissingFeature);
    };

    match &criterion.constraint {
        Constraint::Range { min, max } => {
            let Some(number) = value.as_number() else {
                return CriterionOutcome::FailedWithWarning(FeatureWarningKind::NotNumeric);
            };
            if in_range(number, *min, *max) {
                CriterionOutcome::Passed
            } else {
                CriterionOutcome::Failed
            }
        }
        Constraint::Categorical { value: expected } => {
            let actual = match value {
                FeatureValue::Numeric(v) => format_number(*v),
                FeatureValue::Text(v) => v.clone(),
            };
            if categorical_matches(&actual, expected, policy) {
                CriterionOutcome::Passed
            } else {
                CriterionOutcome::Failed
            }
        }
    }
}

pub fn in_range(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    value.is_finite() && min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

fn categorical_matches(actual: &str, expected: &str, policy: MatchPolicy) -> bool {
    if policy.case_sensitive {
        actual == expected
    } else {
        actual.trim().to_lowercase() == expected.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria() -> CriteriaSet {
        CriteriaSet::new(vec![
            Criterion::range("Age", Some(40.0), Some(75.0)),
            Criterion::categorical("Diagnosis", "Hypertension"),
            Criterion::range("BMI", Some(28.0), Some(35.0)),
        ])
    }

    fn patients() -> Vec<PatientRecord> {
        vec![
            PatientRecord::new("P001")
                .with_feature("Age", 65.0)
                .with_feature("Diagnosis", "Hypertension")
                .with_feature("BMI", 30.0),
            PatientRecord::new("P002")
                .with_feature("Age", 80.0)
                .with_feature("Diagnosis", "Diabetes")
                .with_feature("BMI", 40.0),
        ]
    }

    #[test]
    fn eligible_patient_has_no_failures() {
        let run = evaluate(&patients(), &criteria(), MatchPolicy::default());
        assert_eq!(
            run.results[0],
            EvaluationResult {
                patient_id: "P001".to_string(),
                eligible: true,
                failed_criteria: Vec::new(),
            }
        );
    }

    #[test]
    fn failures_follow_criteria_order() {
        let run = evaluate(&patients(), &criteria(), MatchPolicy::default());
        let p002 = &run.results[1];
        assert!(!p002.eligible);
        assert_eq!(p002.failed_criteria, vec!["Age", "Diagnosis", "BMI"]);
        assert_eq!(run.criteria_order, vec!["Age", "Diagnosis", "BMI"]);
    }

    #[test]
    fn bounds_are_inclusive_and_optional() {
        assert!(in_range(40.0, Some(40.0), Some(75.0)));
        assert!(in_range(75.0, Some(40.0), Some(75.0)));
        assert!(!in_range(75.01, Some(40.0), Some(75.0)));
        assert!(in_range(1e9, Some(40.0), None));
        assert!(in_range(-1e9, None, Some(0.0)));
        assert!(!in_range(f64::NAN, None, Some(0.0)));
    }

    #[test]
    fn missing_feature_fails_with_warning_and_continues() {
        let mut patients = patients();
        patients[0].features.remove("BMI");
        let run = evaluate(&patients, &criteria(), MatchPolicy::default());

        assert_eq!(run.results.len(), 2);
        assert_eq!(run.results[0].failed_criteria, vec!["BMI"]);
        assert_eq!(
            run.warnings,
            vec![FeatureWarning {
                patient_id: "P001".to_string(),
                criterion_name: "BMI".to_string(),
                kind: FeatureWarningKind::MissingFeature,
            }]
        );
    }

    #[test]
    fn text_numbers_are_parsed_and_garbage_is_flagged() {
        let criterion = Criterion::range("Age", Some(40.0), None);
        let policy = MatchPolicy::default();
        assert_eq!(
            evaluate_criterion(Some(&FeatureValue::from(" 52 ")), &criterion, policy),
            CriterionOutcome::Passed
        );
        assert_eq!(
            evaluate_criterion(Some(&FeatureValue::from("old")), &criterion, policy),
            CriterionOutcome::FailedWithWarning(FeatureWarningKind::NotNumeric)
        );
    }

    #[test]
    fn categorical_case_policy() {
        let criterion = Criterion::categorical("Diagnosis", "Hypertension");
        let value = FeatureValue::from("hypertension");
        assert_eq!(
            evaluate_criterion(Some(&value), &criterion, MatchPolicy::default()),
            CriterionOutcome::Failed
        );
        assert_eq!(
            evaluate_criterion(
                Some(&value),
                &criterion,
                MatchPolicy {
                    case_sensitive: false
                }
            ),
            CriterionOutcome::Passed
        );

        let stage = Criterion::categorical("Stage", "2");
        assert!(evaluate_criterion(Some(&FeatureValue::Numeric(2.0)), &stage, MatchPolicy::default())
            .passed());
    }

    #[test]
    fn evaluation_is_repeatable_and_pure() {
        let patients = patients();
        let criteria = criteria();
        let first = evaluate(&patients, &criteria, MatchPolicy::default());
        let second = evaluate(&patients, &criteria, MatchPolicy::default());
        assert_eq!(first, second);
        assert_eq!(patients, self::patients());
        assert_eq!(criteria, self::criteria());
    }

    #[test]
    fn eligible_iff_every_criterion_passes() {
        let criteria = criteria();
        let policy = MatchPolicy::default();
        let mut samples = Vec::new();
        for (idx, age) in [30.0, 40.0, 60.0, 75.0, 90.0].into_iter().enumerate() {
            for (jdx, diagnosis) in ["Hypertension", "Diabetes"].into_iter().enumerate() {
                for (kdx, bmi) in [20.0, 28.0, 35.0, 36.0].into_iter().enumerate() {
                    samples.push(
                        PatientRecord::new(format!("P{idx}{jdx}{kdx}"))
                            .with_feature("Age", age)
                            .with_feature("Diagnosis", diagnosis)
                            .with_feature("BMI", bmi),
                    );
                }
            }
        }
        let run = evaluate(&samples, &criteria, policy);
        for (patient, result) in samples.iter().zip(&run.results) {
            let all_pass = criteria
                .iter()
                .all(|c| evaluate_criterion(patient.feature(&c.name), c, policy).passed());
            assert_eq!(result.eligible, all_pass, "{}", patient.patient_id);
            assert_eq!(result.eligible, result.failed_criteria.is_empty());
        }
    }
}
