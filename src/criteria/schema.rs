use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::error::{ScreeningError, ScreeningResult};

/// Ordered set of eligibility criteria. Order is the extraction order and drives the order
/// of `failed_criteria` in every evaluation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CriteriaSet {
    criteria: Vec<Criterion>,
}

impl CriteriaSet {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Criterion> {
        self.criteria.iter_mut().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.criteria.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.criteria.iter().map(|c| c.name.clone()).collect()
    }

    /// Checks the shape every loaded set must have: non-empty unique names and at least one
    /// bound or an expected value per criterion.
    pub fn validate(&self) -> ScreeningResult<()> {
        let mut seen = BTreeSet::new();
        for criterion in &self.criteria {
            if criterion.name.trim().is_empty() {
                return Err(ScreeningError::InvalidCriteria {
                    name: criterion.name.clone(),
                    reason: "criterion name is empty".to_string(),
                });
            }
            if !seen.insert(criterion.name.as_str()) {
                return Err(ScreeningError::InvalidCriteria {
                    name: criterion.name.clone(),
                    reason: "duplicate criterion name".to_string(),
                });
            }
            criterion.constraint.validate(&criterion.name)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a CriteriaSet {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.criteria.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    pub name: String,
    #[serde(flatten)]
    pub constraint: Constraint,
}

impl Criterion {
    pub fn range(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            constraint: Constraint::Range { min, max },
        }
    }

    pub fn categorical(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: Constraint::Categorical {
                value: value.into(),
            },
        }
    }
}

// Categorical comes first: an untagged `{"value": ..}` must not be read as an unbounded range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Constraint {
    Categorical {
        #[serde(deserialize_with = "categorical_text")]
        value: String,
    },
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

/// Categorical values compare as text; numbers and booleans are read in canonical form.
fn categorical_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawValue {
        Text(String),
        Number(f64),
        Flag(bool),
    }

    Ok(match RawValue::deserialize(deserializer)? {
        RawValue::Text(text) => text,
        RawValue::Number(number) => format_number(number),
        RawValue::Flag(flag) => flag.to_string(),
    })
}

impl Constraint {
    fn validate(&self, name: &str) -> ScreeningResult<()> {
        match self {
            Constraint::Range {
                min: None,
                max: None,
            } => Err(ScreeningError::InvalidCriteria {
                name: name.to_string(),
                reason: "range criterion needs a min or a max".to_string(),
            }),
            Constraint::Range { min, max } => {
                if min.iter().chain(max.iter()).any(|v| !v.is_finite()) {
                    return Err(ScreeningError::InvalidCriteria {
                        name: name.to_string(),
                        reason: "range bounds must be finite".to_string(),
                    });
                }
                Ok(())
            }
            Constraint::Categorical { value } if value.is_empty() => {
                Err(ScreeningError::InvalidCriteria {
                    name: name.to_string(),
                    reason: "categorical criterion needs a value".to_string(),
                })
            }
            Constraint::Categorical { .. } => Ok(()),
        }
    }

    pub fn field(&self, field: CriterionField) -> Option<String> {
        match (self, field) {
            (Constraint::Range { min, .. }, CriterionField::Min) => min.map(format_number),
            (Constraint::Range { max, .. }, CriterionField::Max) => max.map(format_number),
            (Constraint::Categorical { value }, CriterionField::Value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Range {
                min: Some(min),
                max: Some(max),
            } => write!(f, "[{}, {}]", format_number(*min), format_number(*max)),
            Constraint::Range {
                min: Some(min),
                max: None,
            } => write!(f, ">= {}", format_number(*min)),
            Constraint::Range {
                min: None,
                max: Some(max),
            } => write!(f, "<= {}", format_number(*max)),
            Constraint::Range {
                min: None,
                max: None,
            } => write!(f, "any"),
            Constraint::Categorical { value } => write!(f, "== {value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CriterionField {
    Min,
    Max,
    Value,
}

impl Display for CriterionField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Value => "value",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown criterion field: {0}")]
pub struct CriterionFieldParseError(pub String);

impl FromStr for CriterionField {
    type Err = CriterionFieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" | "minimum" => Ok(Self::Min),
            "max" | "maximum" => Ok(Self::Max),
            "value" | "equals" => Ok(Self::Value),
            _ => Err(CriterionFieldParseError(s.to_string())),
        }
    }
}

/// Raw feature value as delivered by the dataset ingester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Text(v) => v.trim().parse::<f64>().ok(),
        }
    }
}

impl Display for FeatureValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Numeric(v) => write!(f, "{}", format_number(*v)),
            FeatureValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Numeric(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Canonical text form of a number: integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_both_criterion_shapes() {
        let set: CriteriaSet = serde_json::from_value(json!([
            {"name": "Age", "min": 40, "max": 75},
            {"name": "Diagnosis", "value": "Hypertension"},
            {"name": "BMI", "max": 35}
        ]))
        .expect("valid criteria");

        assert_eq!(set.names(), vec!["Age", "Diagnosis", "BMI"]);
        assert_eq!(
            set.get("Diagnosis").map(|c| &c.constraint),
            Some(&Constraint::Categorical {
                value: "Hypertension".to_string()
            })
        );
        assert_eq!(
            set.get("BMI").map(|c| &c.constraint),
            Some(&Constraint::Range {
                min: None,
                max: Some(35.0)
            })
        );
    }

    #[test]
    fn rejects_shapeless_and_duplicate_criteria() {
        let shapeless = CriteriaSet::new(vec![Criterion::range("Age", None, None)]);
        assert!(matches!(
            shapeless.validate(),
            Err(ScreeningError::InvalidCriteria { .. })
        ));

        let empty_value = CriteriaSet::new(vec![Criterion::categorical("Diagnosis", "")]);
        assert!(empty_value.validate().is_err());

        let duplicate = CriteriaSet::new(vec![
            Criterion::range("Age", Some(1.0), None),
            Criterion::range("Age", None, Some(2.0)),
        ]);
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn numeric_categorical_value_is_canonical_text() {
        let criterion: Criterion =
            serde_json::from_value(json!({"name": "Stage", "value": 2})).expect("valid criterion");
        assert_eq!(
            criterion.constraint,
            Constraint::Categorical {
                value: "2".to_string()
            }
        );

        let flag: Criterion =
            serde_json::from_value(json!({"name": "Smoker", "value": true})).expect("valid criterion");
        assert_eq!(flag.constraint.field(CriterionField::Value).as_deref(), Some("true"));
    }

    #[test]
    fn formats_numbers_canonically() {
        assert_eq!(format_number(65.0), "65");
        assert_eq!(format_number(27.5), "27.5");
        assert_eq!(FeatureValue::Numeric(-3.0).to_string(), "-3");
    }

    #[test]
    fn parses_field_names() {
        assert_eq!("MIN".parse::<CriterionField>().ok(), Some(CriterionField::Min));
        assert!("median".parse::<CriterionField>().is_err());
    }
}
