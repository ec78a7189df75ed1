//! Reflection session and exchange data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a reflection session.
///
/// Transitions only `InProgress → Completed`, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One guided interview for a dream.
///
/// `current_round` is monotonically non-decreasing and equals the number of
/// persisted exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionSession {
    pub id: Uuid,
    pub profile_id: String,
    pub dream_id: Uuid,
    pub status: SessionStatus,
    pub current_round: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReflectionSession {
    pub fn new(profile_id: impl Into<String>, dream_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id: profile_id.into(),
            dream_id,
            status: SessionStatus::InProgress,
            current_round: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One completed question/answer round. Immutable once written; ordered by
/// round number within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionExchange {
    pub id: Uuid,
    pub session_id: Uuid,
    /// 1-based round number.
    pub round: u32,
    pub question: String,
    pub answer: String,
    /// Optional short AI reflection on the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReflectionExchange {
    pub fn new(
        session_id: Uuid,
        round: u32,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            round,
            question: question.into(),
            answer: answer.into(),
            reflection: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_defaults() {
        let session = ReflectionSession::new("identity-1", Uuid::new_v4());
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.current_round, 0);
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: SessionStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, SessionStatus::Completed);
    }

    #[test]
    fn display_matches_serde() {
        for status in [SessionStatus::InProgress, SessionStatus::Completed] {
            let display = format!("{status}");
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
    }

    #[test]
    fn exchange_serde_roundtrip() {
        let exchange =
            ReflectionExchange::new(Uuid::new_v4(), 1, "Why this dream?", "It matters to me");
        let json = serde_json::to_string(&exchange).unwrap();
        assert!(!json.contains("\"reflection\""));
        let parsed: ReflectionExchange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.round, 1);
        assert_eq!(parsed.question, "Why this dream?");
    }
}
