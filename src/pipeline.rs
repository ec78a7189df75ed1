//! DiscoveryPipeline — the facade the app talks to.
//!
//! Wires the reconciler, interview engine, synthesizer, decomposer and
//! progress tracking over one shared store and one text generator, and walks
//! the onboarding flow end to end: reconcile → interview → synthesis →
//! decomposition → ordered step completion.

use std::path::Path;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{DatabaseError, Error, InterviewError, Result};
use crate::interview::{FiveWhysEngine, ResumePoint, RootMotivationSynthesizer, TurnOutcome};
use crate::llm::TextGenerator;
use crate::profile::{Dream, Profile, ProfileDraft, ProfileReconciler};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::steps::{Action, Breakdown, StepAdvance, StepProgress, TinyStep, TinyStepDecomposer};
use crate::store::Database;

/// What the caller shows the user after an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineTurn {
    /// The interview continues with this question.
    Question(String),
    /// The interview finished and synthesis produced this core motivation.
    Finished { motivation: String },
}

pub struct DiscoveryPipeline {
    db: Arc<dyn Database>,
    reconciler: ProfileReconciler,
    engine: FiveWhysEngine,
    synthesizer: RootMotivationSynthesizer,
    decomposer: TinyStepDecomposer,
    steps: StepProgress,
    tracker: ProgressTracker,
}

impl DiscoveryPipeline {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            reconciler: ProfileReconciler::new(Arc::clone(&db), config.clone()),
            engine: FiveWhysEngine::new(
                Arc::clone(&db),
                Arc::clone(&generator),
                config.clone(),
            ),
            synthesizer: RootMotivationSynthesizer::new(
                Arc::clone(&db),
                Arc::clone(&generator),
                config.clone(),
            ),
            decomposer: TinyStepDecomposer::new(
                Arc::clone(&db),
                Arc::clone(&generator),
                config,
            ),
            steps: StepProgress::new(Arc::clone(&db)),
            tracker: ProgressTracker::new(Arc::clone(&db)),
            db,
        }
    }

    /// Reconcile the profile from the draft and open the interview.
    /// Returns the opening question.
    pub async fn begin_onboarding(
        &self,
        identity: &str,
        draft: &ProfileDraft,
    ) -> Result<String> {
        let profile = self.reconciler.ensure_profile(identity, draft).await?;
        let dream = self.active_dream(identity).await?;
        let question = self.engine.start(&profile, &dream).await?;
        Ok(question)
    }

    /// Resume a persisted interview session after a restart.
    pub async fn resume_interview(
        &self,
        identity: &str,
        session_id: uuid::Uuid,
    ) -> Result<ResumePoint> {
        let profile = self
            .db
            .get_profile(identity)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| {
                Error::Database(DatabaseError::NotFound {
                    entity: "profile".to_string(),
                    id: identity.to_string(),
                })
            })?;
        let dream = self.active_dream(identity).await?;
        let point = self.engine.resume(&profile, &dream, session_id).await?;
        Ok(point)
    }

    /// Submit the answer for the current round. When the final round lands,
    /// synthesis runs immediately and the motivation comes back.
    pub async fn answer(&self, text: &str) -> Result<PipelineTurn> {
        match self.engine.submit_answer(text).await? {
            TurnOutcome::NextQuestion(question) => Ok(PipelineTurn::Question(question)),
            TurnOutcome::Complete => self.finish_interview().await,
        }
    }

    /// Transcribe a voice recording and submit it as the answer.
    pub async fn voice_answer(&self, audio_path: &Path) -> Result<PipelineTurn> {
        match self.engine.submit_voice_answer(audio_path).await? {
            TurnOutcome::NextQuestion(question) => Ok(PipelineTurn::Question(question)),
            TurnOutcome::Complete => self.finish_interview().await,
        }
    }

    /// Retry question generation after a failed round.
    pub async fn retry_question(&self) -> Result<String> {
        Ok(self.engine.retry_question().await?)
    }

    /// The interview session currently loaded, for persisting a resume
    /// pointer.
    pub async fn session_id(&self) -> Option<uuid::Uuid> {
        self.engine.session_id().await
    }

    /// Break an action into tiny steps (or restore an earlier breakdown).
    pub async fn decompose(&self, action: &Action) -> Result<Breakdown> {
        Ok(self.decomposer.decompose(action).await?)
    }

    /// The tiny step the user should be doing now.
    pub async fn current_step(&self, action_id: uuid::Uuid) -> Result<Option<TinyStep>> {
        Ok(self.steps.current(action_id).await?)
    }

    /// Complete the current tiny step; completing the last one completes the
    /// action.
    pub async fn complete_current_step(&self, action_id: uuid::Uuid) -> Result<StepAdvance> {
        Ok(self.steps.complete_current(action_id).await?)
    }

    /// Mark a whole action complete directly (outside the tiny-step walk).
    pub async fn record_completion(&self, action_id: uuid::Uuid) -> Result<bool> {
        Ok(self.tracker.record_completion(action_id).await?)
    }

    /// Current progress for a profile, streaks included.
    pub async fn progress(&self, profile_id: &str) -> Result<ProgressSnapshot> {
        Ok(self.tracker.snapshot(profile_id).await?)
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.db
    }

    async fn finish_interview(&self) -> Result<PipelineTurn> {
        let session_id = self
            .engine
            .session_id()
            .await
            .ok_or(Error::Interview(InterviewError::SessionNotFound {
                id: uuid::Uuid::nil(),
            }))?;
        let motivation = self.synthesizer.finalize(session_id).await?;
        Ok(PipelineTurn::Finished { motivation })
    }

    async fn active_dream(&self, identity: &str) -> Result<Dream> {
        self.db
            .find_active_dream(identity)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| {
                Error::Database(DatabaseError::NotFound {
                    entity: "dream".to_string(),
                    id: identity.to_string(),
                })
            })
    }

    /// The reconciled profile, for rendering.
    pub async fn profile(&self, identity: &str) -> Result<Option<Profile>> {
        Ok(self.db.get_profile(identity).await.map_err(Error::Database)?)
    }
}
