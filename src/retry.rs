//! Fixed-backoff retry utility.
//!
//! Used by the profile reconciler for eventually-consistent reads and by the
//! interview/decomposer components for bounded generation retries.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// A bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted, returning the
    /// last error if all attempts fail.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.expect("at least one attempt was made"))
    }
}
