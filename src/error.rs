use thiserror::Error;

use crate::criteria::CriterionField;
use crate::workflow::{Transition, WorkflowState};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScreeningError {
    #[error("invalid criterion {name:?}: {reason}")]
    InvalidCriteria { name: String, reason: String },
    #[error("unknown criterion: {0}")]
    UnknownCriterion(String),
    #[error("criterion {name:?} has no {field} field")]
    FieldMismatch { name: String, field: CriterionField },
    #[error("invalid number for {name}.{field}: {raw:?}")]
    InvalidNumber {
        name: String,
        field: CriterionField,
        raw: String,
    },
    #[error("cannot summarize an empty dataset")]
    EmptyDataset,
    #[error("duplicate patient id: {0}")]
    DuplicatePatient(String),
    #[error("row {row} has no patient id")]
    MissingPatientId { row: usize },
    #[error("transition {transition:?} is not allowed from {from:?}")]
    InvalidTransition {
        from: WorkflowState,
        transition: Transition,
    },
    #[error("criteria can only be edited while under review, not in {0}")]
    EditNotAllowed(WorkflowState),
    #[error("{0} has not been loaded")]
    Missing(&'static str),
}

pub type ScreeningResult<T> = std::result::Result<T, ScreeningError>;
