//! TinyStepDecomposer — breaks a roadmap action into 3–5 sub-two-minute
//! steps, generated when possible and templated otherwise.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use regex::Regex;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::StepError;
use crate::llm::TextGenerator;
use crate::retry::RetryPolicy;
use crate::steps::model::{Action, TinyStep};
use crate::store::Database;

/// How a breakdown came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOrigin {
    /// Parsed from fresh generator output.
    Generated,
    /// Templated after generation failed or produced too few usable lines.
    Fallback,
    /// Loaded from a previous decomposition of the same action.
    Restored,
}

/// The steps for an action plus where they came from.
#[derive(Debug, Clone)]
pub struct Breakdown {
    pub steps: Vec<TinyStep>,
    pub origin: StepOrigin,
}

pub struct TinyStepDecomposer {
    db: Arc<dyn Database>,
    generator: Arc<dyn TextGenerator>,
    config: PipelineConfig,
    in_flight: Mutex<HashSet<uuid::Uuid>>,
}

impl TinyStepDecomposer {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            generator,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Produce the tiny steps for an action.
    ///
    /// Idempotent per action: existing steps are returned as-is rather than
    /// regenerated, and a concurrent decomposition of the same action is
    /// rejected. The result always holds between `min_steps` and `max_steps`
    /// steps with contiguous 0-based indices.
    pub async fn decompose(&self, action: &Action) -> Result<Breakdown, StepError> {
        let existing = self.db.list_tiny_steps(action.id).await?;
        if !existing.is_empty() {
            return Ok(Breakdown {
                steps: existing,
                origin: StepOrigin::Restored,
            });
        }

        {
            let mut guard = self.in_flight.lock().map_err(|_| {
                StepError::Database(crate::error::DatabaseError::Pool(
                    "in-flight set poisoned".to_string(),
                ))
            })?;
            if !guard.insert(action.id) {
                return Err(StepError::AlreadyInFlight { id: action.id });
            }
        }
        let result = self.decompose_inner(action).await;
        if let Ok(mut guard) = self.in_flight.lock() {
            guard.remove(&action.id);
        }
        result
    }

    async fn decompose_inner(&self, action: &Action) -> Result<Breakdown, StepError> {
        // Re-check under the guard: another caller may have persisted steps
        // between the first read and our insertion into the in-flight set.
        let existing = self.db.list_tiny_steps(action.id).await?;
        if !existing.is_empty() {
            return Ok(Breakdown {
                steps: existing,
                origin: StepOrigin::Restored,
            });
        }

        let prompt = decomposition_prompt(action, self.config.min_steps, self.config.max_steps);
        let policy = RetryPolicy::new(
            self.config.generation_retries + 1,
            self.config.generation_backoff,
        );
        let generator = &self.generator;
        let prompt = prompt.as_str();
        let generated = policy
            .run("step_decomposition", || async move {
                generator.generate(prompt).await
            })
            .await;

        let (parsed, origin) = match generated {
            Ok(text) => {
                let parsed = parse_step_lines(&text, self.config.max_steps);
                if parsed.len() >= self.config.min_steps {
                    (parsed, StepOrigin::Generated)
                } else {
                    warn!(
                        action_id = %action.id,
                        parsed = parsed.len(),
                        "Too few usable step lines, using template"
                    );
                    (fallback_steps(&action.title), StepOrigin::Fallback)
                }
            }
            Err(e) => {
                warn!(action_id = %action.id, error = %e, "Step generation failed, using template");
                (fallback_steps(&action.title), StepOrigin::Fallback)
            }
        };

        let steps: Vec<TinyStep> = parsed
            .into_iter()
            .enumerate()
            .map(|(i, (title, description))| {
                TinyStep::new(action.id, i as u32, title, description)
            })
            .collect();
        self.db.insert_tiny_steps(&steps).await?;

        info!(
            action_id = %action.id,
            count = steps.len(),
            origin = ?origin,
            "Action decomposed"
        );
        Ok(Breakdown { steps, origin })
    }
}

fn decomposition_prompt(action: &Action, min: usize, max: usize) -> String {
    let detail = action
        .description
        .as_deref()
        .map(|d| format!("\nDetails: {d}"))
        .unwrap_or_default();
    format!(
        "Break this task into {min} to {max} tiny physical steps, each doable \
         in under two minutes.\n\
         Task: {title}{detail}\n\n\
         Respond with a numbered list only, one step per line, in the form\n\
         \"1. <short step title>: <one-line description>\". The description \
         is optional.",
        title = action.title,
    )
}

/// Parse numbered step lines into `(title, description)` pairs, keeping at
/// most `max` entries. Unnumbered or empty-titled lines are skipped; the
/// description after the first `:` or ` - ` separator is optional.
fn parse_step_lines(text: &str, max: usize) -> Vec<(String, String)> {
    let line_re = Regex::new(r"^\s*\d+[.)]\s*(.+)$").unwrap();
    let mut steps = Vec::new();
    for line in text.lines() {
        let Some(captures) = line_re.captures(line) else {
            continue;
        };
        let body = captures[1].trim();
        let (title, description) = match body.split_once(':').or_else(|| body.split_once(" - ")) {
            Some((t, d)) => (t.trim(), d.trim()),
            None => (body, ""),
        };
        if title.is_empty() {
            continue;
        }
        steps.push((title.to_string(), description.to_string()));
        if steps.len() == max {
            break;
        }
    }
    steps
}

/// Deterministic four-step breakdown used when generation is unusable.
fn fallback_steps(action_title: &str) -> Vec<(String, String)> {
    vec![
        (
            "Set a two-minute timer".to_string(),
            format!("Decide that for two minutes, \"{action_title}\" is the only thing you do."),
        ),
        (
            "Get what you need in front of you".to_string(),
            "Gather the one or two things the task needs and nothing else.".to_string(),
        ),
        (
            "Do the smallest first piece".to_string(),
            format!("Start the easiest visible part of \"{action_title}\"."),
        ),
        (
            "Note what comes next".to_string(),
            "Write one line about where to pick up next time.".to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TextGenerator;
    use crate::profile::model::Dream;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedGenerator(Option<String>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, crate::error::LlmError> {
            self.0
                .clone()
                .ok_or(crate::error::LlmError::EmptyOutput {
                    provider: "fixed".to_string(),
                })
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            generation_retries: 0,
            generation_backoff: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    async fn seeded_action(db: &Arc<dyn Database>) -> Action {
        db.create_profile_if_absent("id-1").await.unwrap();
        let dream = Dream::new("id-1", "Run a marathon", "wellness");
        db.insert_dream(&dream).await.unwrap();
        let action = Action::new(dream.id, "Go for a first run");
        db.insert_action(&action).await.unwrap();
        action
    }

    #[test]
    fn parse_titles_and_descriptions() {
        let text = "1. Put on shoes: The ones by the door.\n\
                    2. Step outside - No phone.\n\
                    3. Walk one block";
        let steps = parse_step_lines(text, 5);
        assert_eq!(
            steps,
            vec![
                ("Put on shoes".to_string(), "The ones by the door.".to_string()),
                ("Step outside".to_string(), "No phone.".to_string()),
                ("Walk one block".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn parse_skips_unnumbered_lines() {
        let text = "Here are your steps:\n\n1. First thing\nnot a step\n2) Second thing";
        let steps = parse_step_lines(text, 5);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].0, "Second thing");
    }

    #[test]
    fn parse_caps_at_max() {
        let text = (1..=8)
            .map(|i| format!("{i}. Step {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let steps = parse_step_lines(&text, 5);
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[4].0, "Step 5");
    }

    #[test]
    fn parse_empty_text() {
        assert!(parse_step_lines("", 5).is_empty());
        assert!(parse_step_lines("no numbers here", 5).is_empty());
    }

    #[tokio::test]
    async fn decompose_persists_generated_steps() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let action = seeded_action(&db).await;
        let decomposer = TinyStepDecomposer::new(
            Arc::clone(&db),
            Arc::new(FixedGenerator(Some(
                "1. Put on shoes: By the door.\n2. Step outside\n3. Jog one block".to_string(),
            ))),
            config(),
        );

        let breakdown = decomposer.decompose(&action).await.unwrap();
        assert_eq!(breakdown.origin, StepOrigin::Generated);
        assert_eq!(breakdown.steps.len(), 3);
        assert_eq!(
            breakdown.steps.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let stored = db.list_tiny_steps(action.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].title, "Put on shoes");
    }

    #[tokio::test]
    async fn decompose_is_idempotent() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let action = seeded_action(&db).await;
        let decomposer = TinyStepDecomposer::new(
            Arc::clone(&db),
            Arc::new(FixedGenerator(Some(
                "1. A\n2. B\n3. C\n4. D".to_string(),
            ))),
            config(),
        );

        let first = decomposer.decompose(&action).await.unwrap();
        assert_eq!(first.origin, StepOrigin::Generated);

        let second = decomposer.decompose(&action).await.unwrap();
        assert_eq!(second.origin, StepOrigin::Restored);
        assert_eq!(
            second.steps.iter().map(|s| s.id).collect::<Vec<_>>(),
            first.steps.iter().map(|s| s.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn decompose_falls_back_on_generation_failure() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let action = seeded_action(&db).await;
        let decomposer =
            TinyStepDecomposer::new(Arc::clone(&db), Arc::new(FixedGenerator(None)), config());

        let breakdown = decomposer.decompose(&action).await.unwrap();
        assert_eq!(breakdown.origin, StepOrigin::Fallback);
        assert_eq!(breakdown.steps.len(), 4);
        assert!(breakdown.steps[0].title.contains("timer"));
    }

    #[tokio::test]
    async fn decompose_falls_back_on_too_few_lines() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let action = seeded_action(&db).await;
        let decomposer = TinyStepDecomposer::new(
            Arc::clone(&db),
            Arc::new(FixedGenerator(Some("1. Only one step".to_string()))),
            config(),
        );

        let breakdown = decomposer.decompose(&action).await.unwrap();
        assert_eq!(breakdown.origin, StepOrigin::Fallback);
        assert_eq!(breakdown.steps.len(), 4);
    }
}
