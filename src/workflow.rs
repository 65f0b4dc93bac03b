use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{ScreeningError, ScreeningResult};

/// Steps of the screening wizard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Start,
    AwaitingDataset,
    AwaitingCriteria,
    ReviewingCriteria,
    ReviewingDivergence,
    Dashboard,
    FeatureDistribution,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Begin,
    DatasetLoaded,
    CriteriaLoaded,
    /// Leave criteria review. Edited criteria detour through the divergence warning.
    Confirm { diverged: bool },
    AcceptEdits,
    DiscardEdits,
    KeepEditing,
    ViewDistribution,
    Back,
    Restart,
}

impl WorkflowState {
    pub fn next(self, transition: Transition) -> ScreeningResult<Self> {
        use Transition as T;
        use WorkflowState as S;

        let next = match (self, transition) {
            (_, T::Restart) => S::Start,
            (S::Start, T::Begin) => S::AwaitingDataset,
            (S::AwaitingDataset, T::DatasetLoaded) => S::AwaitingCriteria,
            // A new dataset invalidates the run but keeps the criteria under review.
            (S::ReviewingCriteria | S::Dashboard, T::DatasetLoaded) => S::ReviewingCriteria,
            (S::AwaitingCriteria, T::CriteriaLoaded) => S::ReviewingCriteria,
            (S::ReviewingCriteria, T::Confirm { diverged: false }) => S::Dashboard,
            (S::ReviewingCriteria, T::Confirm { diverged: true }) => S::ReviewingDivergence,
            (S::ReviewingDivergence, T::AcceptEdits | T::DiscardEdits) => S::Dashboard,
            (S::ReviewingDivergence, T::KeepEditing) => S::ReviewingCriteria,
            (S::Dashboard, T::ViewDistribution) => S::FeatureDistribution,
            (S::AwaitingDataset, T::Back) => S::Start,
            (S::AwaitingCriteria, T::Back) => S::AwaitingDataset,
            (S::ReviewingCriteria, T::Back) => S::AwaitingCriteria,
            (S::ReviewingDivergence | S::Dashboard, T::Back) => S::ReviewingCriteria,
            (S::FeatureDistribution, T::Back) => S::Dashboard,
            (from, transition) => {
                return Err(ScreeningError::InvalidTransition { from, transition });
            }
        };
        Ok(next)
    }

    pub fn shows_results(self) -> bool {
        matches!(self, Self::Dashboard | Self::FeatureDistribution)
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Start => "start",
            Self::AwaitingDataset => "awaiting dataset",
            Self::AwaitingCriteria => "awaiting criteria",
            Self::ReviewingCriteria => "reviewing criteria",
            Self::ReviewingDivergence => "reviewing divergence",
            Self::Dashboard => "dashboard",
            Self::FeatureDistribution => "feature distribution",
        };
        write!(f, "{display}")
    }
}
