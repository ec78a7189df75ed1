//! Profile and dream data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable user profile, keyed by the authenticated identity id.
///
/// Created exactly once (possibly by an out-of-band trigger on identity
/// creation), updated by the reconciler and at interview completion, never
/// deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Authenticated identity id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared dream, if the user restated it on the profile itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dream: Option<String>,
    /// Declared "stuck point" category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_point: Option<String>,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A fresh, empty profile for an identity.
    pub fn new(identity: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: identity.into(),
            name: None,
            dream: None,
            stuck_point: None,
            onboarding_completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Locally-cached onboarding values applied to the profile once it exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Dream title; a Dream row is created from this if no active dream exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dream: Option<String>,
    /// Dream category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_point: Option<String>,
}

/// A declared dream. At most one dream per identity is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dream {
    pub id: Uuid,
    /// Owning identity id.
    pub profile_id: String,
    pub title: String,
    pub category: String,
    pub active: bool,
    /// Distilled root motivation, written at interview completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_motivation: Option<String>,
    pub five_whys_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dream {
    /// Create a new active dream for an identity.
    pub fn new(
        profile_id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id: profile_id.into(),
            title: title.into(),
            category: category.into(),
            active: true,
            core_motivation: None,
            five_whys_completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_profile_defaults() {
        let profile = Profile::new("identity-1");
        assert_eq!(profile.id, "identity-1");
        assert!(profile.name.is_none());
        assert!(!profile.onboarding_completed);
    }

    #[test]
    fn new_dream_is_active() {
        let dream = Dream::new("identity-1", "Run a marathon", "wellness");
        assert!(dream.active);
        assert!(!dream.five_whys_completed);
        assert!(dream.core_motivation.is_none());
    }

    #[test]
    fn profile_optional_fields_omitted() {
        let profile = Profile::new("u");
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("\"name\""));
        assert!(!json.contains("\"dream\""));
        assert!(!json.contains("\"stuck_point\""));
    }

    #[test]
    fn draft_serde_roundtrip() {
        let draft = ProfileDraft {
            name: Some("Alex".into()),
            dream: Some("Run a marathon".into()),
            category: Some("wellness".into()),
            stuck_point: None,
        };
        let json = serde_json::to_string(&draft).unwrap();
        let parsed: ProfileDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Alex"));
        assert_eq!(parsed.category.as_deref(), Some("wellness"));
        assert!(parsed.stuck_point.is_none());
    }
}
