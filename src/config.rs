//! Configuration types.

use std::time::Duration;

/// Pipeline configuration.
///
/// The interview depth and retry knobs are product constants with sensible
/// defaults; tests exercise shorter depths and zero backoff.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of question/answer rounds in the reflective interview.
    pub interview_depth: u32,
    /// Maximum attempts when polling for the profile row to appear.
    pub profile_poll_attempts: u32,
    /// Fixed delay between profile poll attempts.
    pub profile_poll_backoff: Duration,
    /// Bounded retries for a failed generation call (per question/synthesis).
    pub generation_retries: u32,
    /// Fixed delay between generation retries.
    pub generation_backoff: Duration,
    /// Minimum parsed steps for a decomposition to be accepted.
    pub min_steps: usize,
    /// Maximum steps kept from a decomposition.
    pub max_steps: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interview_depth: 5,
            profile_poll_attempts: 5,
            profile_poll_backoff: Duration::from_secs(1),
            generation_retries: 2,
            generation_backoff: Duration::from_millis(500),
            min_steps: 3,
            max_steps: 5,
        }
    }
}
