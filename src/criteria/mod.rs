pub mod differ;
pub mod loader;
pub mod schema;
pub mod store;

pub use differ::{
    classify_divergence_impact, diff_criteria, CriteriaDivergence, DivergenceImpact, FieldChange,
};
pub use schema::{format_number, Constraint, CriteriaSet, Criterion, CriterionField, FeatureValue};
pub use store::CriteriaStore;
