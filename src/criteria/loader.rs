use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use crate::criteria::schema::{format_number, CriteriaSet, Criterion};

pub fn load_criteria_file(path: &Path) -> Result<CriteriaSet> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading criteria: {}", path.display()))?;
    let set = parse_criteria(&data)
        .with_context(|| format!("failed parsing criteria: {}", path.display()))?;
    info!(path = %path.display(), criteria = set.len(), "loaded criteria document");
    Ok(set)
}

/// Parses extractor output. Both an ordered array of criteria and an object keyed by
/// criterion name are accepted; in the object form a bare string, number or boolean is a
/// categorical value.
pub fn parse_criteria(data: &str) -> Result<CriteriaSet> {
    let value: Value = serde_json::from_str(data)?;
    let value = match value {
        Value::Object(mut map) if is_wrapper(&map) => map
            .remove("criteria")
            .ok_or_else(|| anyhow!("criteria key vanished"))?,
        other => other,
    };
    criteria_from_value(value)
}

/// `{"criteria": [..]}` or `{"criteria": {name: ..}}`. A lone criterion that happens to be
/// named `criteria` (a scalar, or an object shaped like a constraint) is not a wrapper.
fn is_wrapper(map: &Map<String, Value>) -> bool {
    if map.len() != 1 {
        return false;
    }
    match map.get("criteria") {
        Some(Value::Array(_)) => true,
        Some(Value::Object(inner)) => !["min", "max", "value"]
            .iter()
            .any(|key| inner.contains_key(*key)),
        _ => false,
    }
}

pub fn criteria_from_value(value: Value) -> Result<CriteriaSet> {
    let criteria = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value::<Criterion>)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Value::Object(map) => map
            .into_iter()
            .map(|(name, spec)| criterion_from_entry(name, spec))
            .collect::<Result<Vec<_>>>()?,
        other => return Err(anyhow!("expected an array or object of criteria, got {other}")),
    };
    Ok(CriteriaSet::new(criteria))
}

fn criterion_from_entry(name: String, spec: Value) -> Result<Criterion> {
    match spec {
        Value::String(value) => Ok(Criterion::categorical(name, value)),
        Value::Number(number) => {
            let value = number
                .as_f64()
                .map(format_number)
                .ok_or_else(|| anyhow!("invalid criterion {name:?}: {number}"))?;
            Ok(Criterion::categorical(name, value))
        }
        Value::Bool(flag) => Ok(Criterion::categorical(name, flag.to_string())),
        Value::Object(mut fields) => {
            fields.insert("name".to_string(), Value::String(name.clone()));
            serde_json::from_value(Value::Object(fields))
                .with_context(|| format!("invalid criterion {name:?}"))
        }
        other => Err(anyhow!("invalid criterion {name:?}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::schema::{Constraint, CriterionField};

    #[test]
    fn object_form_keeps_document_order() {
        let set = parse_criteria(
            r#"{"Age": {"min": 40, "max": 75}, "Diagnosis": "Hypertension", "BMI": {"min": 28, "max": 35}}"#,
        )
        .expect("valid document");
        assert_eq!(set.names(), vec!["Age", "Diagnosis", "BMI"]);
        assert_eq!(
            set.get("Diagnosis").map(|c| c.constraint.clone()),
            Some(Constraint::Categorical {
                value: "Hypertension".to_string()
            })
        );
    }

    #[test]
    fn array_form_and_wrapper_key() {
        let set = parse_criteria(
            r#"{"criteria": [{"name": "Smoker", "value": "no"}, {"name": "HbA1c", "max": 7.5}]}"#,
        )
        .expect("valid document");
        assert_eq!(set.names(), vec!["Smoker", "HbA1c"]);
    }

    #[test]
    fn rejects_scalars() {
        assert!(parse_criteria("42").is_err());
        assert!(parse_criteria(r#"{"Age": null}"#).is_err());
        assert!(parse_criteria(r#"{"Age": [40, 75]}"#).is_err());
    }

    #[test]
    fn scalar_entries_are_categorical_text() {
        let set = parse_criteria(r#"{"Stage": 2, "Smoker": false, "Grade": 1.5}"#)
            .expect("valid document");
        let values = set
            .iter()
            .map(|c| c.constraint.field(CriterionField::Value))
            .collect::<Vec<_>>();
        assert_eq!(
            values,
            vec![
                Some("2".to_string()),
                Some("false".to_string()),
                Some("1.5".to_string())
            ]
        );
    }

    #[test]
    fn criterion_named_criteria_is_not_a_wrapper() {
        let set = parse_criteria(r#"{"criteria": {"min": 1}, "Age": {"max": 75}}"#)
            .expect("valid document");
        assert_eq!(set.names(), vec!["criteria", "Age"]);

        let lone = parse_criteria(r#"{"criteria": {"max": 3}}"#).expect("valid document");
        assert_eq!(
            lone.get("criteria").map(|c| c.constraint.clone()),
            Some(Constraint::Range {
                min: None,
                max: Some(3.0)
            })
        );

        let wrapped = parse_criteria(r#"{"criteria": {"Age": {"min": 40}}}"#)
            .expect("valid document");
        assert_eq!(wrapped.names(), vec!["Age"]);
    }
}
