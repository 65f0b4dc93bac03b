use serde::{Deserialize, Serialize};

use crate::criteria::schema::{Constraint, CriteriaSet, CriterionField};
use crate::eligibility::EvaluationRun;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriteriaDivergence {
    pub criterion_name: String,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: CriterionField,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// How a set of edits moves patients across the eligibility line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DivergenceImpact {
    pub now_eligible: Vec<String>,
    pub now_ineligible: Vec<String>,
    pub unchanged: usize,
}

/// Field-wise comparison of every criterion in `original` against its counterpart in
/// `edited`. Only changed criteria are reported, and for range criteria only the bounds
/// that actually moved.
pub fn diff_criteria(original: &CriteriaSet, edited: &CriteriaSet) -> Vec<CriteriaDivergence> {
    let mut divergences = Vec::new();
    for before in original {
        let after = edited.get(&before.name).map(|c| &c.constraint);
        let changes = match (&before.constraint, after) {
            (
                Constraint::Range {
                    min: old_min,
                    max: old_max,
                },
                Some(Constraint::Range {
                    min: new_min,
                    max: new_max,
                }),
            ) => {
                let mut changes = Vec::new();
                if old_min != new_min {
                    changes.push(field_change(CriterionField::Min, &before.constraint, after));
                }
                if old_max != new_max {
                    changes.push(field_change(CriterionField::Max, &before.constraint, after));
                }
                changes
            }
            (Constraint::Categorical { value: old }, Some(Constraint::Categorical { value: new })) => {
                if old != new {
                    vec![field_change(CriterionField::Value, &before.constraint, after)]
                } else {
                    Vec::new()
                }
            }
            // Shape changed or the criterion is gone: every field of either side is reported.
            _ => [CriterionField::Min, CriterionField::Max, CriterionField::Value]
                .into_iter()
                .map(|field| field_change(field, &before.constraint, after))
                .filter(|change| change.before != change.after)
                .collect(),
        };
        if !changes.is_empty() {
            divergences.push(CriteriaDivergence {
                criterion_name: before.name.clone(),
                changes,
            });
        }
    }
    divergences
}

/// Compares a run under the original criteria with a run under the edited ones. Patients
/// are matched by id; patients present in only one run are ignored.
pub fn classify_divergence_impact(before: &EvaluationRun, after: &EvaluationRun) -> DivergenceImpact {
    let mut impact = DivergenceImpact::default();
    for old in &before.results {
        let Some(new) = after.results.iter().find(|r| r.patient_id == old.patient_id) else {
            continue;
        };
        match (old.eligible, new.eligible) {
            (false, true) => impact.now_eligible.push(new.patient_id.clone()),
            (true, false) => impact.now_ineligible.push(new.patient_id.clone()),
            _ => impact.unchanged += 1,
        }
    }
    impact
}

fn field_change(
    field: CriterionField,
    before: &Constraint,
    after: Option<&Constraint>,
) -> FieldChange {
    FieldChange {
        field,
        before: before.field(field),
        after: after.and_then(|c| c.field(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::schema::Criterion;
    use crate::eligibility::EvaluationResult;

    fn original() -> CriteriaSet {
        CriteriaSet::new(vec![
            Criterion::range("Age", Some(40.0), Some(75.0)),
            Criterion::categorical("Diagnosis", "Hypertension"),
        ])
    }

    #[test]
    fn reports_only_changed_bounds() {
        let edited = CriteriaSet::new(vec![
            Criterion::range("Age", Some(40.0), Some(80.0)),
            Criterion::categorical("Diagnosis", "Hypertension"),
        ]);
        let diff = diff_criteria(&original(), &edited);
        assert_eq!(
            diff,
            vec![CriteriaDivergence {
                criterion_name: "Age".to_string(),
                changes: vec![FieldChange {
                    field: CriterionField::Max,
                    before: Some("75".to_string()),
                    after: Some("80".to_string()),
                }],
            }]
        );
    }

    #[test]
    fn ignores_criterion_order() {
        let reordered = CriteriaSet::new(vec![
            Criterion::categorical("Diagnosis", "Hypertension"),
            Criterion::range("Age", Some(40.0), Some(75.0)),
        ]);
        assert!(diff_criteria(&original(), &reordered).is_empty());
    }

    #[test]
    fn reports_categorical_and_removed_criteria() {
        let edited = CriteriaSet::new(vec![Criterion::categorical("Diagnosis", "Diabetes")]);
        let diff = diff_criteria(&original(), &edited);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].criterion_name, "Age");
        assert_eq!(diff[0].changes.len(), 2);
        assert!(diff[0].changes.iter().all(|c| c.after.is_none()));
        assert_eq!(diff[1].changes[0].after.as_deref(), Some("Diabetes"));
    }

    #[test]
    fn classifies_patients_crossing_the_line() {
        let result = |id: &str, eligible: bool| EvaluationResult {
            patient_id: id.to_string(),
            eligible,
            failed_criteria: if eligible {
                Vec::new()
            } else {
                vec!["Age".to_string()]
            },
        };
        let before = EvaluationRun {
            criteria_order: vec!["Age".to_string()],
            results: vec![result("P1", true), result("P2", false), result("P3", true)],
            warnings: Vec::new(),
        };
        let after = EvaluationRun {
            criteria_order: vec!["Age".to_string()],
            results: vec![result("P1", false), result("P2", true), result("P3", true)],
            warnings: Vec::new(),
        };
        let impact = classify_divergence_impact(&before, &after);
        assert_eq!(impact.now_eligible, vec!["P2".to_string()]);
        assert_eq!(impact.now_ineligible, vec!["P1".to_string()]);
        assert_eq!(impact.unchanged, 1);
    }
}
