//! ProfileReconciler — makes sure a durable profile row exists and carries
//! the locally-cached onboarding draft before dependent writes proceed.
//!
//! The profile row may be created asynchronously by an out-of-band trigger
//! when the identity is created, so the row may not be visible yet when the
//! pipeline starts. The reconciler polls with a fixed backoff and creates
//! the row itself with an idempotent insert, so a racing creation by the
//! other path never produces a duplicate-key failure.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{DatabaseError, ReconcileError};
use crate::profile::model::{Dream, Profile, ProfileDraft};
use crate::retry::RetryPolicy;
use crate::store::Database;

pub struct ProfileReconciler {
    db: Arc<dyn Database>,
    config: PipelineConfig,
}

impl ProfileReconciler {
    pub fn new(db: Arc<dyn Database>, config: PipelineConfig) -> Self {
        Self { db, config }
    }

    /// Ensure a profile exists for `identity` and apply the draft to it.
    ///
    /// Polls up to `profile_poll_attempts` times with a fixed backoff; if
    /// the row never becomes visible the pipeline cannot proceed and a
    /// terminal [`ReconcileError::ProfileUnavailable`] is returned.
    ///
    /// Idempotent: calling twice with the same draft is a no-op update and
    /// creates no duplicate Dream rows.
    pub async fn ensure_profile(
        &self,
        identity: &str,
        draft: &ProfileDraft,
    ) -> Result<Profile, ReconcileError> {
        let policy = RetryPolicy::new(
            self.config.profile_poll_attempts,
            self.config.profile_poll_backoff,
        );

        let db = &self.db;
        policy
            .run("profile_poll", || async move {
                if db.get_profile(identity).await?.is_some() {
                    return Ok(());
                }
                // Absent: attempt the create ourselves, then re-check. The
                // upsert is keyed by identity id, so losing the race to the
                // out-of-band trigger is harmless.
                db.create_profile_if_absent(identity).await?;
                match db.get_profile(identity).await? {
                    Some(_) => Ok(()),
                    None => Err(ReconcileError::Database(DatabaseError::NotFound {
                        entity: "profile".to_string(),
                        id: identity.to_string(),
                    })),
                }
            })
            .await
            .map_err(|e| {
                warn!(identity, error = %e, "Profile never became visible");
                ReconcileError::ProfileUnavailable {
                    identity: identity.to_string(),
                    attempts: self.config.profile_poll_attempts,
                }
            })?;

        // The very first create may have been performed by the out-of-band
        // trigger, so the draft is applied as a separate targeted update.
        self.db
            .update_profile_draft(identity, draft.name.as_deref(), draft.stuck_point.as_deref())
            .await?;

        self.ensure_active_dream(identity, draft).await?;

        let profile = self
            .db
            .get_profile(identity)
            .await?
            .ok_or_else(|| ReconcileError::ProfileUnavailable {
                identity: identity.to_string(),
                attempts: self.config.profile_poll_attempts,
            })?;

        info!(identity, "Profile reconciled");
        Ok(profile)
    }

    /// Create a Dream from the draft if a title was supplied and no active
    /// dream exists. Conditional on absence, preserving the at-most-one
    /// active dream invariant.
    async fn ensure_active_dream(
        &self,
        identity: &str,
        draft: &ProfileDraft,
    ) -> Result<(), ReconcileError> {
        let Some(title) = draft.dream.as_deref() else {
            return Ok(());
        };
        if self.db.find_active_dream(identity).await?.is_some() {
            return Ok(());
        }

        let category = draft.category.as_deref().unwrap_or("general");
        let dream = Dream::new(identity, title, category);
        self.db.insert_dream(&dream).await?;
        info!(identity, title, "Active dream created from draft");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use std::time::Duration;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            profile_poll_attempts: 3,
            profile_poll_backoff: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    fn draft() -> ProfileDraft {
        ProfileDraft {
            name: Some("Alex".into()),
            dream: Some("Run a marathon".into()),
            category: Some("wellness".into()),
            stuck_point: None,
        }
    }

    #[tokio::test]
    async fn creates_profile_and_dream() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let reconciler = ProfileReconciler::new(Arc::clone(&db), test_config());

        let profile = reconciler.ensure_profile("id-1", &draft()).await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alex"));
        assert!(profile.dream.is_none());
        assert!(!profile.onboarding_completed);

        let dream = db.find_active_dream("id-1").await.unwrap().unwrap();
        assert_eq!(dream.title, "Run a marathon");
        assert_eq!(dream.category, "wellness");
        assert!(dream.active);
    }

    #[tokio::test]
    async fn second_call_is_noop_update() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let reconciler = ProfileReconciler::new(Arc::clone(&db), test_config());

        let first = reconciler.ensure_profile("id-1", &draft()).await.unwrap();
        let second = reconciler.ensure_profile("id-1", &draft()).await.unwrap();
        assert_eq!(first.id, second.id);

        // Exactly one active dream, not two.
        let dream = db.find_active_dream("id-1").await.unwrap().unwrap();
        assert_eq!(dream.title, "Run a marathon");
        let another = reconciler.ensure_profile("id-1", &draft()).await.unwrap();
        assert_eq!(another.id, "id-1");
        let still = db.find_active_dream("id-1").await.unwrap().unwrap();
        assert_eq!(still.id, dream.id);
    }

    #[tokio::test]
    async fn existing_profile_is_updated_not_duplicated() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        // Simulate the out-of-band trigger creating the row first.
        db.create_profile_if_absent("id-1").await.unwrap();

        let reconciler = ProfileReconciler::new(Arc::clone(&db), test_config());
        let profile = reconciler.ensure_profile("id-1", &draft()).await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alex"));
    }

    #[tokio::test]
    async fn no_dream_created_without_title() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let reconciler = ProfileReconciler::new(Arc::clone(&db), test_config());

        let empty = ProfileDraft::default();
        reconciler.ensure_profile("id-1", &empty).await.unwrap();
        assert!(db.find_active_dream("id-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keeps_existing_active_dream() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.create_profile_if_absent("id-1").await.unwrap();
        let existing = Dream::new("id-1", "Write a novel", "creative");
        db.insert_dream(&existing).await.unwrap();

        let reconciler = ProfileReconciler::new(Arc::clone(&db), test_config());
        reconciler.ensure_profile("id-1", &draft()).await.unwrap();

        let active = db.find_active_dream("id-1").await.unwrap().unwrap();
        assert_eq!(active.id, existing.id, "Draft must not replace the active dream");
    }
}
