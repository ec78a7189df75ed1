//! Action and tiny-step data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A roadmap action belonging to a dream. Completion is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    /// Owning dream.
    pub dream_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-readable duration estimate, e.g. "10 min".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    pub fn new(dream_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dream_id,
            title: title.into(),
            description: None,
            duration_estimate: None,
            category: None,
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Builder: set duration estimate.
    pub fn with_duration(mut self, estimate: impl Into<String>) -> Self {
        self.duration_estimate = Some(estimate.into());
        self
    }

    /// Builder: set category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// One sub-two-minute unit of an action.
///
/// Steps complete strictly in `index` order; only the first incomplete step
/// is ever actionable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TinyStep {
    pub id: Uuid,
    /// Owning action.
    pub action_id: Uuid,
    /// 0-based position in the breakdown.
    pub index: u32,
    pub title: String,
    /// Empty when the generated line carried no description.
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl TinyStep {
    pub fn new(
        action_id: Uuid,
        index: u32,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_id,
            index,
            title: title.into(),
            description: description.into(),
            completed: false,
            created_at: Utc::now(),
        }
    }
}
