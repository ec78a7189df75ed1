//! RootMotivationSynthesizer — distills the finished interview into a
//! one-or-two sentence core motivation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::InterviewError;
use crate::interview::prompts;
use crate::llm::TextGenerator;
use crate::retry::RetryPolicy;
use crate::store::Database;

pub struct RootMotivationSynthesizer {
    db: Arc<dyn Database>,
    generator: Arc<dyn TextGenerator>,
    config: PipelineConfig,
}

impl RootMotivationSynthesizer {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            generator,
            config,
        }
    }

    /// Synthesize the core motivation from a fully-answered session.
    ///
    /// Requires the complete transcript. Generation falls back to a templated
    /// statement, so this always returns a non-empty motivation; the follow-up
    /// writes (session closed, motivation stored, onboarding flagged) are
    /// best-effort and never block the returned value.
    pub async fn finalize(&self, session_id: uuid::Uuid) -> Result<String, InterviewError> {
        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or(InterviewError::SessionNotFound { id: session_id })?;

        let dream = self
            .db
            .find_active_dream(&session.profile_id)
            .await?
            .filter(|d| d.id == session.dream_id)
            .ok_or_else(|| InterviewError::Database(crate::error::DatabaseError::NotFound {
                entity: "dream".to_string(),
                id: session.dream_id.to_string(),
            }))?;

        let exchanges = self.db.list_exchanges(session_id).await?;
        if (exchanges.len() as u32) < self.config.interview_depth {
            return Err(InterviewError::IncompleteTranscript {
                id: session_id,
                count: exchanges.len(),
                expected: self.config.interview_depth,
            });
        }

        let prompt = prompts::synthesis_prompt(&dream, &exchanges);
        let policy = RetryPolicy::new(
            self.config.generation_retries + 1,
            self.config.generation_backoff,
        );
        let generator = &self.generator;
        let prompt = prompt.as_str();
        let motivation = match policy
            .run("motivation_synthesis", || async move {
                generator.generate(prompt).await
            })
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(session_id = %session_id, "Synthesis returned empty text, using template");
                prompts::fallback_motivation(&dream)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Synthesis failed, using template");
                prompts::fallback_motivation(&dream)
            }
        };

        // Eventual-consistency writes. A failure here leaves the transcript
        // intact, so finalize can be re-run later.
        if let Err(e) = self.db.complete_session(session_id).await {
            warn!(session_id = %session_id, error = %e, "Failed to mark session completed");
        }
        if let Err(e) = self.db.set_dream_motivation(dream.id, &motivation).await {
            warn!(dream_id = %dream.id, error = %e, "Failed to store core motivation");
        }
        if let Err(e) = self.db.set_onboarding_completed(&session.profile_id).await {
            warn!(profile_id = %session.profile_id, error = %e, "Failed to flag onboarding");
        }

        info!(session_id = %session_id, dream_id = %dream.id, "Motivation synthesized");
        Ok(motivation)
    }
}
