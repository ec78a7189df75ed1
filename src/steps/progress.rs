//! StepProgress — walks the tiny steps of an action strictly in order.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::StepError;
use crate::steps::model::TinyStep;
use crate::store::Database;

/// Result of completing a step.
#[derive(Debug, Clone)]
pub enum StepAdvance {
    /// The next step to do.
    NextStep(TinyStep),
    /// That was the last step; the owning action is now complete.
    AllComplete,
}

pub struct StepProgress {
    db: Arc<dyn Database>,
}

impl StepProgress {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// The step the user should be doing now: the lowest-index incomplete
    /// step. `None` once every step is done.
    pub async fn current(&self, action_id: uuid::Uuid) -> Result<Option<TinyStep>, StepError> {
        let steps = self.ordered_steps(action_id).await?;
        Ok(steps.into_iter().find(|s| !s.completed))
    }

    /// Complete the current step and advance.
    ///
    /// Completing the final step also completes the owning action; the
    /// underlying writes are idempotent, so a repeated call after the last
    /// step reports `AlreadyComplete` without double-counting.
    pub async fn complete_current(
        &self,
        action_id: uuid::Uuid,
    ) -> Result<StepAdvance, StepError> {
        let steps = self.ordered_steps(action_id).await?;
        let current = steps
            .iter()
            .find(|s| !s.completed)
            .ok_or(StepError::AlreadyComplete { action_id })?;

        self.db.complete_tiny_step(current.id).await?;
        info!(action_id = %action_id, index = current.index, "Tiny step completed");

        let next = steps
            .iter()
            .find(|s| !s.completed && s.index > current.index)
            .cloned();
        match next {
            Some(step) => Ok(StepAdvance::NextStep(step)),
            None => {
                self.db.complete_action(action_id, Utc::now()).await?;
                info!(action_id = %action_id, "All steps done, action completed");
                Ok(StepAdvance::AllComplete)
            }
        }
    }

    /// Complete a specific step, enforcing index order: only the lowest-index
    /// incomplete step may be completed.
    pub async fn complete_step(
        &self,
        action_id: uuid::Uuid,
        step_id: uuid::Uuid,
    ) -> Result<StepAdvance, StepError> {
        let steps = self.ordered_steps(action_id).await?;
        let current = steps
            .iter()
            .find(|s| !s.completed)
            .ok_or(StepError::AlreadyComplete { action_id })?;

        if current.id != step_id {
            let index = steps
                .iter()
                .find(|s| s.id == step_id)
                .map(|s| s.index)
                .unwrap_or(u32::MAX);
            return Err(StepError::OutOfOrder { index });
        }

        self.complete_current(action_id).await
    }

    async fn ordered_steps(&self, action_id: uuid::Uuid) -> Result<Vec<TinyStep>, StepError> {
        let steps = self.db.list_tiny_steps(action_id).await?;
        if steps.is_empty() {
            return Err(StepError::NoSteps { action_id });
        }
        Ok(steps)
    }
}
