use std::collections::BTreeMap;

use crate::criteria::FeatureValue;
use crate::eligibility::EvaluationRun;
use crate::patients::PatientRecord;
use crate::report::{DistributionBucket, FeatureDistribution};

/// Histogram of one feature split by eligibility. When every present value is numeric
/// the values are bucketed into `bins` equal-width bins over the observed range;
/// otherwise each distinct value is its own bucket, most frequent first.
pub fn feature_distribution(
    patients: &[PatientRecord],
    run: &EvaluationRun,
    feature: &str,
    bins: usize,
) -> FeatureDistribution {
    let mut observed = Vec::new();
    let mut missing = 0usize;
    for patient in patients {
        let eligible = run
            .result_for(&patient.patient_id)
            .map(|r| r.eligible)
            .unwrap_or(false);
        match patient.feature(feature) {
            Some(value) => observed.push((value, eligible)),
            None => missing += 1,
        }
    }

    let numeric = observed
        .iter()
        .map(|(value, eligible)| match value {
            FeatureValue::Numeric(v) if v.is_finite() => Some((*v, *eligible)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>();

    let buckets = match numeric {
        Some(values) if !values.is_empty() => numeric_buckets(&values, bins.max(1)),
        _ => categorical_buckets(&observed),
    };

    FeatureDistribution {
        feature: feature.to_string(),
        buckets,
        missing,
    }
}

fn numeric_buckets(values: &[(f64, bool)], bins: usize) -> Vec<DistributionBucket> {
    let lo = values.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min);
    let hi = values.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / bins as f64;
    if width <= 0.0 {
        let mut bucket = DistributionBucket::new(format!("{lo}"), Some(lo), Some(hi));
        for (_, eligible) in values {
            bucket.record(*eligible);
        }
        return vec![bucket];
    }

    let mut buckets = (0..bins)
        .map(|idx| {
            let start = lo + width * idx as f64;
            let end = if idx + 1 == bins { hi } else { start + width };
            DistributionBucket::new(format!("{start:.1}-{end:.1}"), Some(start), Some(end))
        })
        .collect::<Vec<_>>();
    for (value, eligible) in values {
        let idx = (((value - lo) / width) as usize).min(bins - 1);
        buckets[idx].record(*eligible);
    }
    buckets
}

fn categorical_buckets(observed: &[(&FeatureValue, bool)]) -> Vec<DistributionBucket> {
    let mut by_label: BTreeMap<String, DistributionBucket> = BTreeMap::new();
    for (value, eligible) in observed {
        let label = value.to_string();
        by_label
            .entry(label.clone())
            .or_insert_with(|| DistributionBucket::new(label, None, None))
            .record(*eligible);
    }
    let mut buckets = by_label.into_values().collect::<Vec<_>>();
    // BTreeMap order is the tie-break, so equal counts stay alphabetical.
    buckets.sort_by(|a, b| b.total().cmp(&a.total()));
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::EvaluationResult;

    fn run_for(ids: &[(&str, bool)]) -> EvaluationRun {
        EvaluationRun {
            criteria_order: vec!["Age".to_string()],
            results: ids
                .iter()
                .map(|(id, eligible)| EvaluationResult {
                    patient_id: id.to_string(),
                    eligible: *eligible,
                    failed_criteria: if *eligible {
                        Vec::new()
                    } else {
                        vec!["Age".to_string()]
                    },
                })
                .collect(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn buckets_numeric_values_evenly() {
        let patients = vec![
            PatientRecord::new("P1").with_feature("Age", 40.0),
            PatientRecord::new("P2").with_feature("Age", 50.0),
            PatientRecord::new("P3").with_feature("Age", 60.0),
            PatientRecord::new("P4").with_feature("Age", 80.0),
            PatientRecord::new("P5"),
        ];
        let run = run_for(&[
            ("P1", true),
            ("P2", true),
            ("P3", false),
            ("P4", false),
            ("P5", false),
        ]);
        let dist = feature_distribution(&patients, &run, "Age", 4);

        assert_eq!(dist.missing, 1);
        assert_eq!(dist.buckets.len(), 4);
        let counts = dist
            .buckets
            .iter()
            .map(|b| (b.eligible, b.ineligible))
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![(1, 0), (1, 0), (0, 1), (0, 1)]);
        assert_eq!(dist.buckets[3].upper, Some(80.0));
    }

    #[test]
    fn single_value_collapses_to_one_bucket() {
        let patients = vec![
            PatientRecord::new("P1").with_feature("BMI", 30.0),
            PatientRecord::new("P2").with_feature("BMI", 30.0),
        ];
        let run = run_for(&[("P1", true), ("P2", false)]);
        let dist = feature_distribution(&patients, &run, "BMI", 10);
        assert_eq!(dist.buckets.len(), 1);
        assert_eq!(dist.buckets[0].total(), 2);
    }

    #[test]
    fn counts_categories_by_frequency() {
        let patients = vec![
            PatientRecord::new("P1").with_feature("Diagnosis", "Diabetes"),
            PatientRecord::new("P2").with_feature("Diagnosis", "Hypertension"),
            PatientRecord::new("P3").with_feature("Diagnosis", "Hypertension"),
            PatientRecord::new("P4").with_feature("Diagnosis", "Asthma"),
        ];
        let run = run_for(&[("P1", false), ("P2", true), ("P3", false), ("P4", false)]);
        let dist = feature_distribution(&patients, &run, "Diagnosis", 10);
        let labels = dist
            .buckets
            .iter()
            .map(|b| b.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Hypertension", "Asthma", "Diabetes"]);
        assert_eq!((dist.buckets[0].eligible, dist.buckets[0].ineligible), (1, 1));
    }
}
