use std::collections::BTreeMap;

use tracing::debug;

use crate::criteria::differ::{diff_criteria, CriteriaDivergence};
use crate::criteria::schema::{Constraint, CriteriaSet, CriterionField};
use crate::error::{ScreeningError, ScreeningResult};

/// Holds the extracted criteria next to the user's working copy.
///
/// Numeric edits are accepted while they are still being typed: text such as `""`, `"-"`
/// or `"12e"` is kept as a draft and only has to become a finite number once the field is
/// finalized or the criteria are read for evaluation.
#[derive(Debug, Clone, Default)]
pub struct CriteriaStore {
    original: CriteriaSet,
    working: CriteriaSet,
    drafts: BTreeMap<(String, CriterionField), String>,
}

impl CriteriaStore {
    pub fn from_extracted(original: CriteriaSet) -> ScreeningResult<Self> {
        let mut store = Self::default();
        store.load(original)?;
        Ok(store)
    }

    pub fn load(&mut self, original: CriteriaSet) -> ScreeningResult<()> {
        original.validate()?;
        debug!(criteria = original.len(), "loaded extracted criteria");
        self.working = original.clone();
        self.original = original;
        self.drafts.clear();
        Ok(())
    }

    pub fn original(&self) -> &CriteriaSet {
        &self.original
    }

    pub fn working(&self) -> &CriteriaSet {
        &self.working
    }

    pub fn pending_drafts(&self) -> impl Iterator<Item = (&str, CriterionField, &str)> {
        self.drafts
            .iter()
            .map(|((name, field), raw)| (name.as_str(), *field, raw.as_str()))
    }

    pub fn set_field(&mut self, name: &str, field: CriterionField, raw: &str) -> ScreeningResult<()> {
        let criterion = self
            .working
            .get_mut(name)
            .ok_or_else(|| ScreeningError::UnknownCriterion(name.to_string()))?;

        match (&mut criterion.constraint, field) {
            (Constraint::Categorical { value }, CriterionField::Value) => {
                *value = raw.to_string();
                Ok(())
            }
            (Constraint::Range { min, max }, CriterionField::Min | CriterionField::Max) => {
                let bound = if field == CriterionField::Min { min } else { max };
                let key = (name.to_string(), field);
                let trimmed = raw.trim();
                match trimmed.parse::<f64>() {
                    Ok(parsed) if parsed.is_finite() => {
                        *bound = Some(parsed);
                        self.drafts.remove(&key);
                        Ok(())
                    }
                    _ if is_numeric_prefix(trimmed) => {
                        self.drafts.insert(key, trimmed.to_string());
                        Ok(())
                    }
                    _ => Err(ScreeningError::InvalidNumber {
                        name: name.to_string(),
                        field,
                        raw: raw.to_string(),
                    }),
                }
            }
            _ => Err(ScreeningError::FieldMismatch {
                name: name.to_string(),
                field,
            }),
        }
    }

    /// Resolves the draft of one field, as on loss of focus. A blank bound becomes `0`.
    pub fn finalize_field(&mut self, name: &str, field: CriterionField) -> ScreeningResult<()> {
        if self.working.get(name).is_none() {
            return Err(ScreeningError::UnknownCriterion(name.to_string()));
        }
        let key = (name.to_string(), field);
        let Some(raw) = self.drafts.get(&key) else {
            return Ok(());
        };
        let value = resolve_draft(name, field, raw)?;
        if let Some(criterion) = self.working.get_mut(name) {
            set_bound(&mut criterion.constraint, field, value);
        }
        self.drafts.remove(&key);
        Ok(())
    }

    /// Resolves every pending draft. Blank drafts are always applied; the first draft that
    /// is still not a number is reported and left pending.
    pub fn finalize(&mut self) -> ScreeningResult<()> {
        let keys = self.drafts.keys().cloned().collect::<Vec<_>>();
        let mut first_error = None;
        for (name, field) in keys {
            if let Err(err) = self.finalize_field(&name, field) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// True when the criteria as they would be evaluated differ from the extracted ones.
    /// A draft that cannot be resolved to a number yet always counts as a change.
    pub fn has_diverged(&self) -> bool {
        match self.active_criteria() {
            Ok(active) => !diff_criteria(&self.original, &active).is_empty(),
            Err(_) => true,
        }
    }

    /// Field-wise changes against the extracted criteria. Resolvable drafts are compared by
    /// the value they resolve to; while any draft is unresolvable the last accepted values
    /// are compared.
    pub fn diff(&self) -> Vec<CriteriaDivergence> {
        let active = self.active_criteria();
        diff_criteria(&self.original, active.as_ref().unwrap_or(&self.working))
    }

    pub fn reset_to_original(&mut self) {
        self.working = self.original.clone();
        self.drafts.clear();
    }

    /// The working copy as it would be evaluated, with blank drafts read as `0`.
    pub fn active_criteria(&self) -> ScreeningResult<CriteriaSet> {
        let mut active = self.working.clone();
        for ((name, field), raw) in &self.drafts {
            let value = resolve_draft(name, *field, raw)?;
            if let Some(criterion) = active.get_mut(name) {
                set_bound(&mut criterion.constraint, *field, value);
            }
        }
        Ok(active)
    }
}

fn resolve_draft(name: &str, field: CriterionField, raw: &str) -> ScreeningResult<f64> {
    if raw.trim().is_empty() {
        return Ok(0.0);
    }
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ScreeningError::InvalidNumber {
            name: name.to_string(),
            field,
            raw: raw.to_string(),
        }),
    }
}

fn set_bound(constraint: &mut Constraint, field: CriterionField, value: f64) {
    if let Constraint::Range { min, max } = constraint {
        match field {
            CriterionField::Min => *min = Some(value),
            CriterionField::Max => *max = Some(value),
            CriterionField::Value => {}
        }
    }
}

/// True when `text` could still grow into a decimal number: `"-"`, `"."`, `"4."`, `"1e"`.
fn is_numeric_prefix(text: &str) -> bool {
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let mut prev = None;
    for (idx, ch) in text.chars().enumerate() {
        match ch {
            '0'..='9' => seen_digit = true,
            '+' | '-' => {
                if idx != 0 && !matches!(prev, Some('e' | 'E')) {
                    return false;
                }
            }
            '.' => {
                if seen_dot || seen_exp {
                    return false;
                }
                seen_dot = true;
            }
            'e' | 'E' => {
                if seen_exp || !seen_digit {
                    return false;
                }
                seen_exp = true;
            }
            _ => return false,
        }
        prev = Some(ch);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::schema::Criterion;

    fn extracted() -> CriteriaSet {
        CriteriaSet::new(vec![
            Criterion::range("Age", Some(40.0), Some(75.0)),
            Criterion::categorical("Diagnosis", "Hypertension"),
            Criterion::range("BMI", Some(28.0), Some(35.0)),
        ])
    }

    #[test]
    fn load_rejects_invalid_shape() {
        let mut store = CriteriaStore::default();
        let bad = CriteriaSet::new(vec![Criterion::range("Age", None, None)]);
        assert!(matches!(
            store.load(bad),
            Err(ScreeningError::InvalidCriteria { .. })
        ));
    }

    #[test]
    fn blank_bound_finalizes_to_zero() {
        let mut store = CriteriaStore::from_extracted(extracted()).expect("valid criteria");
        store
            .set_field("Age", CriterionField::Min, "")
            .expect("blank is a valid draft");
        store.finalize().expect("blank resolves");

        let age = store.working().get("Age").expect("age criterion");
        assert_eq!(
            age.constraint,
            Constraint::Range {
                min: Some(0.0),
                max: Some(75.0)
            }
        );
    }

    #[test]
    fn partial_numbers_are_held_until_finalized() {
        let mut store = CriteriaStore::from_extracted(extracted()).expect("valid criteria");
        store
            .set_field("BMI", CriterionField::Max, "3.")
            .expect("trailing dot parses");
        store
            .set_field("Age", CriterionField::Max, "-")
            .expect("sign is a valid prefix");
        assert!(store.has_diverged());
        assert!(matches!(
            store.active_criteria(),
            Err(ScreeningError::InvalidNumber { .. })
        ));

        store
            .set_field("Age", CriterionField::Max, "70")
            .expect("complete number");
        let active = store.active_criteria().expect("no unresolved drafts");
        assert_eq!(
            active.get("Age").map(|c| c.constraint.clone()),
            Some(Constraint::Range {
                min: Some(40.0),
                max: Some(70.0)
            })
        );
    }

    #[test]
    fn rejects_unknown_names_and_mismatched_fields() {
        let mut store = CriteriaStore::from_extracted(extracted()).expect("valid criteria");
        assert_eq!(
            store.set_field("Weight", CriterionField::Min, "1"),
            Err(ScreeningError::UnknownCriterion("Weight".to_string()))
        );
        assert!(matches!(
            store.set_field("Diagnosis", CriterionField::Min, "1"),
            Err(ScreeningError::FieldMismatch { .. })
        ));
        assert!(matches!(
            store.set_field("Age", CriterionField::Min, "forty"),
            Err(ScreeningError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn categorical_edits_are_verbatim() {
        let mut store = CriteriaStore::from_extracted(extracted()).expect("valid criteria");
        store
            .set_field("Diagnosis", CriterionField::Value, "  diabetes ")
            .expect("any text is accepted");
        assert_eq!(
            store.working().get("Diagnosis").map(|c| c.constraint.clone()),
            Some(Constraint::Categorical {
                value: "  diabetes ".to_string()
            })
        );
    }

    #[test]
    fn reset_clears_divergence() {
        let mut store = CriteriaStore::from_extracted(extracted()).expect("valid criteria");
        assert!(!store.has_diverged());
        store
            .set_field("Age", CriterionField::Min, "50")
            .expect("valid edit");
        store
            .set_field("BMI", CriterionField::Min, "")
            .expect("valid draft");
        assert!(store.has_diverged());

        store.reset_to_original();
        assert!(!store.has_diverged());
        assert_eq!(store.working(), store.original());
    }

    #[test]
    fn editing_back_to_the_original_value_is_not_divergence() {
        let mut store = CriteriaStore::from_extracted(extracted()).expect("valid criteria");
        store
            .set_field("Age", CriterionField::Min, "41")
            .expect("valid edit");
        store
            .set_field("Age", CriterionField::Min, "40.0")
            .expect("valid edit");
        assert!(!store.has_diverged());
    }

    #[test]
    fn blank_draft_matching_the_original_is_not_divergence() {
        let mut store = CriteriaStore::from_extracted(CriteriaSet::new(vec![Criterion::range(
            "Age",
            Some(0.0),
            Some(75.0),
        )]))
        .expect("valid criteria");
        store
            .set_field("Age", CriterionField::Min, "")
            .expect("blank is a valid draft");
        assert_eq!(store.pending_drafts().count(), 1);
        assert!(!store.has_diverged());
        assert!(store.diff().is_empty());

        store
            .set_field("Age", CriterionField::Max, "")
            .expect("blank is a valid draft");
        assert!(store.has_diverged());
        assert_eq!(store.diff()[0].changes[0].after.as_deref(), Some("0"));
    }

    #[test]
    fn numeric_prefixes() {
        for ok in ["", "-", "+", ".", "4.", "-0.5", "1e", "1e-", "2.5E+3"] {
            assert!(is_numeric_prefix(ok), "{ok:?} should be a prefix");
        }
        for bad in ["abc", "1..2", "e5", "1-2", "4,5", "inf"] {
            assert!(!is_numeric_prefix(bad), "{bad:?} should be rejected");
        }
    }
}
