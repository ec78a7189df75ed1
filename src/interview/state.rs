//! Interview state machine.

use serde::{Deserialize, Serialize};

/// The states of the fixed-depth interview.
///
/// Progresses `Idle → AwaitingAnswer(1) → Generating(1) → AwaitingAnswer(2)
/// → … → Complete`. `Generating` is re-entered on generation failure so a
/// round is never skipped; resuming a session lands back in `AwaitingAnswer`
/// at `count(exchanges) + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InterviewState {
    /// No session started or loaded.
    Idle,
    /// A question has been asked and the user's answer is pending.
    AwaitingAnswer { round: u32, question: String },
    /// The answer for `round` is persisted; the next question (or the
    /// completion hand-off) has not succeeded yet.
    Generating { round: u32 },
    /// All rounds answered. No further answers are accepted.
    Complete,
}

impl InterviewState {
    /// The round this state concerns, if any.
    pub fn round(&self) -> Option<u32> {
        match self {
            Self::AwaitingAnswer { round, .. } | Self::Generating { round } => Some(*round),
            Self::Idle | Self::Complete => None,
        }
    }

    /// Whether the interview is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Short name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingAnswer { .. } => "awaiting_answer",
            Self::Generating { .. } => "generating",
            Self::Complete => "complete",
        }
    }
}

impl Default for InterviewState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for InterviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.round() {
            Some(round) => write!(f, "{}({round})", self.name()),
            None => write!(f, "{}", self.name()),
        }
    }
}
