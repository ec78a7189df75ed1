//! FiveWhysEngine — drives the fixed-depth reflective interview.
//!
//! Each submitted answer is persisted before any generation call, so a
//! failed call never loses user input and never advances a round silently:
//! the machine stays in `Generating` and the caller retries via
//! [`FiveWhysEngine::retry_question`].

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::InterviewError;
use crate::interview::model::{ReflectionExchange, ReflectionSession, SessionStatus};
use crate::interview::prompts;
use crate::interview::state::InterviewState;
use crate::llm::TextGenerator;
use crate::profile::model::{Dream, Profile};
use crate::retry::RetryPolicy;
use crate::store::Database;

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The next question to ask.
    NextQuestion(String),
    /// All rounds answered; hand off to the synthesizer.
    Complete,
}

/// Where a resumed session picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    /// The interview continues at `round` with this question.
    AwaitingAnswer { round: u32, question: String },
    /// All rounds were already answered.
    Complete,
}

struct SessionContext {
    session_id: uuid::Uuid,
    dream: Dream,
}

pub struct FiveWhysEngine {
    db: Arc<dyn Database>,
    generator: Arc<dyn TextGenerator>,
    config: PipelineConfig,
    ctx: RwLock<Option<SessionContext>>,
    state: RwLock<InterviewState>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the current operation ends, on every path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FiveWhysEngine {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            generator,
            config,
            ctx: RwLock::new(None),
            state: RwLock::new(InterviewState::Idle),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Current state (for UI rendering).
    pub async fn state(&self) -> InterviewState {
        self.state.read().await.clone()
    }

    /// The active session's id, if a session is loaded.
    pub async fn session_id(&self) -> Option<uuid::Uuid> {
        self.ctx.read().await.as_ref().map(|c| c.session_id)
    }

    /// Start a new session for a dream. Returns the opening question,
    /// personalized when generation succeeds and templated otherwise.
    pub async fn start(&self, profile: &Profile, dream: &Dream) -> Result<String, InterviewError> {
        let session = ReflectionSession::new(profile.id.clone(), dream.id);
        self.db.insert_session(&session).await?;

        let prompt = prompts::opening_question_prompt(profile, dream);
        let question = match self.generate(&prompt).await {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "Opening question generation failed, using template");
                prompts::fallback_opening_question(profile, dream)
            }
        };

        *self.ctx.write().await = Some(SessionContext {
            session_id: session.id,
            dream: dream.clone(),
        });
        *self.state.write().await = InterviewState::AwaitingAnswer {
            round: 1,
            question: question.clone(),
        };

        info!(session_id = %session.id, dream = %dream.title, "Interview started");
        Ok(question)
    }

    /// Resume a persisted session after a restart.
    ///
    /// The current round is recomputed as `count(exchanges) + 1`; answered
    /// rounds are never re-asked.
    pub async fn resume(
        &self,
        profile: &Profile,
        dream: &Dream,
        session_id: uuid::Uuid,
    ) -> Result<ResumePoint, InterviewError> {
        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or(InterviewError::SessionNotFound { id: session_id })?;

        let exchanges = self.db.list_exchanges(session_id).await?;
        let answered = exchanges.len() as u32;

        *self.ctx.write().await = Some(SessionContext {
            session_id,
            dream: dream.clone(),
        });

        if session.status == SessionStatus::Completed || answered >= self.config.interview_depth {
            *self.state.write().await = InterviewState::Complete;
            return Ok(ResumePoint::Complete);
        }

        let round = answered + 1;
        let question = if answered == 0 {
            match self
                .generate(&prompts::opening_question_prompt(profile, dream))
                .await
            {
                Ok(q) => q,
                Err(_) => prompts::fallback_opening_question(profile, dream),
            }
        } else {
            match self
                .generate(&prompts::next_question_prompt(dream, &exchanges, round))
                .await
            {
                Ok(q) => q,
                Err(e) => {
                    // Persisted progress is intact; the caller retries.
                    *self.state.write().await = InterviewState::Generating { round: answered };
                    return Err(InterviewError::GenerationFailed {
                        round,
                        reason: e.to_string(),
                    });
                }
            }
        };

        *self.state.write().await = InterviewState::AwaitingAnswer {
            round,
            question: question.clone(),
        };
        info!(session_id = %session_id, round, "Interview resumed");
        Ok(ResumePoint::AwaitingAnswer { round, question })
    }

    /// Submit the answer for the current round.
    ///
    /// Persists the exchange, then either generates the next question or
    /// signals completion when the final round was answered. Single-flight:
    /// a concurrent duplicate invocation is rejected.
    pub async fn submit_answer(&self, text: &str) -> Result<TurnOutcome, InterviewError> {
        let answer = text.trim();
        if answer.is_empty() {
            return Err(InterviewError::EmptyAnswer);
        }

        let session_id = self
            .session_id()
            .await
            .ok_or(InterviewError::SessionNotFound { id: uuid::Uuid::nil() })?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(InterviewError::AlreadyInFlight { id: session_id });
        }
        let _guard = InFlightGuard(&self.in_flight);

        let (round, question) = {
            let state = self.state.read().await;
            match &*state {
                InterviewState::AwaitingAnswer { round, question } => {
                    (*round, question.clone())
                }
                other => {
                    return Err(InterviewError::InvalidState {
                        id: session_id,
                        expected: "awaiting_answer".to_string(),
                        actual: other.to_string(),
                    });
                }
            }
        };

        let exchange = ReflectionExchange::new(session_id, round, question, answer);
        self.db.insert_exchange(&exchange).await?;
        self.db.set_session_round(session_id, round).await?;
        *self.state.write().await = InterviewState::Generating { round };

        if round >= self.config.interview_depth {
            *self.state.write().await = InterviewState::Complete;
            info!(session_id = %session_id, "Interview complete, ready for synthesis");
            return Ok(TurnOutcome::Complete);
        }

        let question = self.next_question(session_id, round).await?;
        Ok(TurnOutcome::NextQuestion(question))
    }

    /// Transcribe a voice answer and submit the transcript.
    pub async fn submit_voice_answer(
        &self,
        audio_path: &Path,
    ) -> Result<TurnOutcome, InterviewError> {
        let transcript = self.generator.transcribe(audio_path).await?;
        self.submit_answer(&transcript).await
    }

    /// Retry question generation after a failed round. Valid only in
    /// `Generating`; the already-persisted exchange is reused.
    pub async fn retry_question(&self) -> Result<String, InterviewError> {
        let session_id = self
            .session_id()
            .await
            .ok_or(InterviewError::SessionNotFound { id: uuid::Uuid::nil() })?;

        let round = {
            let state = self.state.read().await;
            match &*state {
                InterviewState::Generating { round } => *round,
                other => {
                    return Err(InterviewError::InvalidState {
                        id: session_id,
                        expected: "generating".to_string(),
                        actual: other.to_string(),
                    });
                }
            }
        };

        self.next_question(session_id, round).await
    }

    /// Generate the question for `answered + 1`, conditioned on the full
    /// persisted history. On failure the state stays `Generating(answered)`.
    async fn next_question(
        &self,
        session_id: uuid::Uuid,
        answered: u32,
    ) -> Result<String, InterviewError> {
        let exchanges = self.db.list_exchanges(session_id).await?;
        let next_round = answered + 1;

        let prompt = {
            let ctx = self.ctx.read().await;
            let ctx = ctx
                .as_ref()
                .ok_or(InterviewError::SessionNotFound { id: session_id })?;
            prompts::next_question_prompt(&ctx.dream, &exchanges, next_round)
        };

        match self.generate(&prompt).await {
            Ok(question) => {
                *self.state.write().await = InterviewState::AwaitingAnswer {
                    round: next_round,
                    question: question.clone(),
                };
                Ok(question)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    round = next_round,
                    error = %e,
                    "Question generation failed, round not advanced"
                );
                Err(InterviewError::GenerationFailed {
                    round: next_round,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, crate::error::LlmError> {
        let policy = RetryPolicy::new(
            self.config.generation_retries + 1,
            self.config.generation_backoff,
        );
        let generator = &self.generator;
        policy
            .run("question_generation", || async move {
                generator.generate(prompt).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TextGenerator;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Pops scripted results in order; errors once the script is exhausted.
    struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<String, ()>>>,
        delay: Duration,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<String, ()>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                delay: Duration::ZERO,
            }
        }

        fn answering(questions: &[&str]) -> Self {
            Self::new(questions.iter().map(|q| Ok(q.to_string())).collect())
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, crate::error::LlmError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(text)) => Ok(text),
                _ => Err(crate::error::LlmError::EmptyOutput {
                    provider: "scripted".to_string(),
                }),
            }
        }

        async fn transcribe(
            &self,
            _audio_path: &Path,
        ) -> Result<String, crate::error::LlmError> {
            Ok("transcribed answer".to_string())
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn no_retry_config(depth: u32) -> PipelineConfig {
        PipelineConfig {
            interview_depth: depth,
            generation_retries: 0,
            generation_backoff: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    async fn fixtures(db: &Arc<dyn Database>) -> (Profile, Dream) {
        db.create_profile_if_absent("id-1").await.unwrap();
        let mut profile = Profile::new("id-1");
        profile.name = Some("Alex".into());
        let dream = Dream::new("id-1", "Run a marathon", "wellness");
        db.insert_dream(&dream).await.unwrap();
        (profile, dream)
    }

    #[tokio::test]
    async fn full_interview_flow() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        let generator = Arc::new(ScriptedGenerator::answering(&[
            "Q1?", "Q2?", "Q3?", "Q4?", "Q5?",
        ]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        let opening = engine.start(&profile, &dream).await.unwrap();
        assert_eq!(opening, "Q1?");
        let session_id = engine.session_id().await.unwrap();

        for round in 1..5u32 {
            // count(exchanges) == current round - 1 at every observed state
            let exchanges = db.list_exchanges(session_id).await.unwrap();
            assert_eq!(exchanges.len() as u32, round - 1);

            let outcome = engine.submit_answer(&format!("answer {round}")).await.unwrap();
            assert_eq!(outcome, TurnOutcome::NextQuestion(format!("Q{}?", round + 1)));
        }

        let outcome = engine.submit_answer("final answer").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Complete);
        assert!(engine.state().await.is_terminal());

        // Gapless rounds starting at 1.
        let exchanges = db.list_exchanges(session_id).await.unwrap();
        assert_eq!(
            exchanges.iter().map(|e| e.round).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        // No further answers accepted.
        let rejected = engine.submit_answer("extra").await;
        assert!(matches!(rejected, Err(InterviewError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn empty_answer_rejected() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        let generator = Arc::new(ScriptedGenerator::answering(&["Q1?"]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        engine.start(&profile, &dream).await.unwrap();
        assert!(matches!(
            engine.submit_answer("   ").await,
            Err(InterviewError::EmptyAnswer)
        ));
        // State unchanged.
        assert_eq!(engine.state().await.round(), Some(1));
    }

    #[tokio::test]
    async fn opening_falls_back_to_template() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(())]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        let opening = engine.start(&profile, &dream).await.unwrap();
        assert!(opening.contains("Alex"));
        assert!(opening.contains("Run a marathon"));
        assert_eq!(engine.state().await.round(), Some(1));
    }

    #[tokio::test]
    async fn generation_failure_keeps_exchange_and_round() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        // Opening succeeds, next-question generation fails once, then works.
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("Q1?".to_string()),
            Err(()),
            Ok("Q2?".to_string()),
        ]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        engine.start(&profile, &dream).await.unwrap();
        let session_id = engine.session_id().await.unwrap();

        let failed = engine.submit_answer("my answer").await;
        assert!(matches!(
            failed,
            Err(InterviewError::GenerationFailed { round: 2, .. })
        ));

        // The exchange for round 1 is persisted and the round not advanced.
        let exchanges = db.list_exchanges(session_id).await.unwrap();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(engine.state().await, InterviewState::Generating { round: 1 });

        // Retrying does not re-ask round 1.
        let question = engine.retry_question().await.unwrap();
        assert_eq!(question, "Q2?");
        assert_eq!(engine.state().await.round(), Some(2));
        assert_eq!(db.list_exchanges(session_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resume_recomputes_round_from_exchanges() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;

        // Simulate a prior run that answered 2 of 5 rounds.
        let session = ReflectionSession::new(profile.id.clone(), dream.id);
        db.insert_session(&session).await.unwrap();
        for round in 1..=2u32 {
            db.insert_exchange(&ReflectionExchange::new(
                session.id,
                round,
                format!("q{round}"),
                format!("a{round}"),
            ))
            .await
            .unwrap();
        }

        let generator = Arc::new(ScriptedGenerator::answering(&["Q3?"]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        let point = engine.resume(&profile, &dream, session.id).await.unwrap();
        assert_eq!(
            point,
            ResumePoint::AwaitingAnswer {
                round: 3,
                question: "Q3?".to_string()
            }
        );
    }

    #[tokio::test]
    async fn resume_of_answered_out_session_is_complete() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;

        let session = ReflectionSession::new(profile.id.clone(), dream.id);
        db.insert_session(&session).await.unwrap();
        for round in 1..=2u32 {
            db.insert_exchange(&ReflectionExchange::new(session.id, round, "q", "a"))
                .await
                .unwrap();
        }

        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(2));

        let point = engine.resume(&profile, &dream, session.id).await.unwrap();
        assert_eq!(point, ResumePoint::Complete);
        assert!(engine.state().await.is_terminal());
    }

    #[tokio::test]
    async fn resume_of_unknown_session_fails() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        let missing = uuid::Uuid::new_v4();
        assert!(matches!(
            engine.resume(&profile, &dream, missing).await,
            Err(InterviewError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_submit_is_rejected() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        let generator = Arc::new(
            ScriptedGenerator::answering(&["Q1?", "Q2?", "Q2?"])
                .with_delay(Duration::from_millis(100)),
        );
        let engine = Arc::new(FiveWhysEngine::new(
            Arc::clone(&db),
            generator,
            no_retry_config(5),
        ));

        engine.start(&profile, &dream).await.unwrap();

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.submit_answer("a").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = engine.submit_answer("b").await;

        assert!(matches!(
            second,
            Err(InterviewError::AlreadyInFlight { .. })
        ));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn voice_answer_is_transcribed_then_submitted() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (profile, dream) = fixtures(&db).await;
        let generator = Arc::new(ScriptedGenerator::answering(&["Q1?", "Q2?"]));
        let engine = FiveWhysEngine::new(Arc::clone(&db), generator, no_retry_config(5));

        engine.start(&profile, &dream).await.unwrap();
        let session_id = engine.session_id().await.unwrap();

        let outcome = engine
            .submit_voice_answer(Path::new("/tmp/answer.m4a"))
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::NextQuestion(_)));

        let exchanges = db.list_exchanges(session_id).await.unwrap();
        assert_eq!(exchanges[0].answer, "transcribed answer");
    }
}
