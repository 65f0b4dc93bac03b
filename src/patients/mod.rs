pub mod ingest;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::criteria::FeatureValue;
use crate::error::{ScreeningError, ScreeningResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub patient_id: String,
    #[serde(default)]
    pub features: BTreeMap<String, FeatureValue>,
}

impl PatientRecord {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }
}

/// Patients in ingestion order. Ids are unique within a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Dataset {
    patients: Vec<PatientRecord>,
}

impl Dataset {
    pub fn new(patients: Vec<PatientRecord>) -> ScreeningResult<Self> {
        let mut seen = BTreeSet::new();
        for patient in &patients {
            if !seen.insert(patient.patient_id.as_str()) {
                return Err(ScreeningError::DuplicatePatient(patient.patient_id.clone()));
            }
        }
        Ok(Self { patients })
    }

    pub fn patients(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    pub fn get(&self, patient_id: &str) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.patient_id == patient_id)
    }

    /// Union of feature names across all patients, sorted.
    pub fn feature_names(&self) -> Vec<String> {
        self.patients
            .iter()
            .flat_map(|p| p.features.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_ids() {
        let result = Dataset::new(vec![PatientRecord::new("P001"), PatientRecord::new("P001")]);
        assert_eq!(
            result,
            Err(ScreeningError::DuplicatePatient("P001".to_string()))
        );
    }

    #[test]
    fn collects_feature_names() {
        let dataset = Dataset::new(vec![
            PatientRecord::new("P001").with_feature("Age", 65.0),
            PatientRecord::new("P002").with_feature("BMI", 30.0).with_feature("Age", 70.0),
        ])
        .expect("unique ids");
        assert_eq!(dataset.feature_names(), vec!["Age", "BMI"]);
        assert!(dataset.get("P002").is_some());
    }
}
