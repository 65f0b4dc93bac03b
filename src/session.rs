use tracing::info;

use crate::criteria::{
    classify_divergence_impact, CriteriaDivergence, CriteriaSet, CriteriaStore, CriterionField,
    DivergenceImpact,
};
use crate::eligibility::evaluator::{evaluate, MatchPolicy};
use crate::eligibility::EvaluationRun;
use crate::error::{ScreeningError, ScreeningResult};
use crate::patients::Dataset;
use crate::report::{build_dashboard, feature_distribution, DashboardReport, FeatureDistribution};
use crate::workflow::{Transition, WorkflowState};

/// One pass through the screening wizard.
///
/// The evaluation run is derived state: it is dropped whenever the dataset or the
/// criteria change and rebuilt from scratch when the dashboard is entered.
#[derive(Debug, Clone, Default)]
pub struct ScreeningSession {
    state: WorkflowState,
    policy: MatchPolicy,
    dataset: Option<Dataset>,
    store: Option<CriteriaStore>,
    run: Option<EvaluationRun>,
}

impl ScreeningSession {
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn store(&self) -> Option<&CriteriaStore> {
        self.store.as_ref()
    }

    pub fn run(&self) -> Option<&EvaluationRun> {
        self.run.as_ref()
    }

    pub fn begin(&mut self) -> ScreeningResult<WorkflowState> {
        self.advance(Transition::Begin)
    }

    pub fn load_dataset(&mut self, dataset: Dataset) -> ScreeningResult<WorkflowState> {
        let next = self.state.next(Transition::DatasetLoaded)?;
        info!(patients = dataset.len(), "dataset attached to session");
        self.dataset = Some(dataset);
        self.run = None;
        self.commit(next);
        Ok(next)
    }

    pub fn load_criteria(&mut self, extracted: CriteriaSet) -> ScreeningResult<WorkflowState> {
        let next = self.state.next(Transition::CriteriaLoaded)?;
        self.store = Some(CriteriaStore::from_extracted(extracted)?);
        self.run = None;
        self.commit(next);
        Ok(next)
    }

    /// Edits one field of the working criteria. Only allowed in criteria review, so every
    /// edit reaches the dashboard through `confirm`.
    pub fn set_field(&mut self, name: &str, field: CriterionField, raw: &str) -> ScreeningResult<()> {
        self.ensure_editable()?;
        self.store_mut()?.set_field(name, field, raw)?;
        self.run = None;
        Ok(())
    }

    pub fn finalize_field(&mut self, name: &str, field: CriterionField) -> ScreeningResult<()> {
        self.ensure_editable()?;
        self.store_mut()?.finalize_field(name, field)?;
        self.run = None;
        Ok(())
    }

    /// Leaves criteria review. Unchanged criteria go straight to the dashboard; edited
    /// ones stop at the divergence review first.
    pub fn confirm(&mut self) -> ScreeningResult<WorkflowState> {
        // Both outcomes share the same source state; check it before drafts are resolved.
        self.state.next(Transition::Confirm { diverged: false })?;
        let store = self.store_mut()?;
        store.finalize()?;
        let diverged = store.has_diverged();
        self.advance(Transition::Confirm { diverged })
    }

    pub fn divergence(&self) -> ScreeningResult<Vec<CriteriaDivergence>> {
        Ok(self.store_ref()?.diff())
    }

    /// Which patients the pending edits move across the eligibility line.
    pub fn divergence_impact(&self) -> ScreeningResult<DivergenceImpact> {
        let dataset = self.dataset_ref()?;
        let store = self.store_ref()?;
        let before = evaluate(dataset.patients(), store.original(), self.policy);
        let after = evaluate(dataset.patients(), &store.active_criteria()?, self.policy);
        Ok(classify_divergence_impact(&before, &after))
    }

    pub fn accept_edits(&mut self) -> ScreeningResult<WorkflowState> {
        self.advance(Transition::AcceptEdits)
    }

    pub fn discard_edits(&mut self) -> ScreeningResult<WorkflowState> {
        // Validate before resetting so a rejected transition leaves the edits alone.
        self.state.next(Transition::DiscardEdits)?;
        self.store_mut()?.reset_to_original();
        self.run = None;
        self.advance(Transition::DiscardEdits)
    }

    pub fn keep_editing(&mut self) -> ScreeningResult<WorkflowState> {
        self.advance(Transition::KeepEditing)
    }

    pub fn back(&mut self) -> ScreeningResult<WorkflowState> {
        self.advance(Transition::Back)
    }

    pub fn restart(&mut self) -> WorkflowState {
        let policy = self.policy;
        *self = Self::new(policy);
        info!("session restarted");
        self.state
    }

    pub fn dashboard(&self, terminal_limit: usize) -> ScreeningResult<DashboardReport> {
        let run = self
            .run
            .as_ref()
            .ok_or(ScreeningError::Missing("evaluation run"))?;
        build_dashboard(run, terminal_limit)
    }

    pub fn view_distribution(
        &mut self,
        feature: &str,
        bins: usize,
    ) -> ScreeningResult<FeatureDistribution> {
        if self.state != WorkflowState::FeatureDistribution {
            self.advance(Transition::ViewDistribution)?;
        }
        let run = self
            .run
            .as_ref()
            .ok_or(ScreeningError::Missing("evaluation run"))?;
        Ok(feature_distribution(
            self.dataset_ref()?.patients(),
            run,
            feature,
            bins,
        ))
    }

    fn advance(&mut self, transition: Transition) -> ScreeningResult<WorkflowState> {
        let next = self.state.next(transition)?;
        if next.shows_results() && self.run.is_none() {
            self.run = Some(self.evaluate()?);
        }
        self.commit(next);
        Ok(next)
    }

    fn ensure_editable(&self) -> ScreeningResult<()> {
        if self.state == WorkflowState::ReviewingCriteria {
            Ok(())
        } else {
            Err(ScreeningError::EditNotAllowed(self.state))
        }
    }

    fn commit(&mut self, next: WorkflowState) {
        if next != self.state {
            info!(from = %self.state, to = %next, "workflow transition");
        }
        self.state = next;
    }

    fn evaluate(&self) -> ScreeningResult<EvaluationRun> {
        let dataset = self.dataset_ref()?;
        let criteria = self.store_ref()?.active_criteria()?;
        Ok(evaluate(dataset.patients(), &criteria, self.policy))
    }

    fn dataset_ref(&self) -> ScreeningResult<&Dataset> {
        self.dataset.as_ref().ok_or(ScreeningError::Missing("dataset"))
    }

    fn store_ref(&self) -> ScreeningResult<&CriteriaStore> {
        self.store.as_ref().ok_or(ScreeningError::Missing("criteria"))
    }

    fn store_mut(&mut self) -> ScreeningResult<&mut CriteriaStore> {
        self.store.as_mut().ok_or(ScreeningError::Missing("criteria"))
    }
}
