//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::model::{ReflectionExchange, ReflectionSession};
use crate::profile::model::{Dream, Profile};
use crate::steps::model::{Action, TinyStep};

/// Backend-agnostic database trait covering profiles, dreams, sessions,
/// exchanges, actions, and tiny steps.
///
/// Mutations are targeted field updates, not full-row overwrites, so
/// concurrent partial updates from other flows are not clobbered.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Look up a profile by identity id.
    async fn get_profile(&self, identity: &str) -> Result<Option<Profile>, DatabaseError>;

    /// Create a profile row for an identity if none exists. Idempotent:
    /// a racing creation by another path must not fail with a duplicate key.
    async fn create_profile_if_absent(&self, identity: &str) -> Result<(), DatabaseError>;

    /// Apply draft fields to an existing profile. Only the provided fields
    /// are written.
    async fn update_profile_draft(
        &self,
        identity: &str,
        name: Option<&str>,
        stuck_point: Option<&str>,
    ) -> Result<(), DatabaseError>;

    /// Mark onboarding as completed.
    async fn set_onboarding_completed(&self, identity: &str) -> Result<(), DatabaseError>;

    // ── Dreams ──────────────────────────────────────────────────────

    /// Insert a new dream.
    async fn insert_dream(&self, dream: &Dream) -> Result<(), DatabaseError>;

    /// Find the active dream for an identity, if any.
    async fn find_active_dream(&self, identity: &str) -> Result<Option<Dream>, DatabaseError>;

    /// Record the synthesized core motivation and mark the five-whys
    /// interview complete for a dream.
    async fn set_dream_motivation(
        &self,
        dream_id: Uuid,
        motivation: &str,
    ) -> Result<(), DatabaseError>;

    // ── Reflection sessions ─────────────────────────────────────────

    /// Insert a new session.
    async fn insert_session(&self, session: &ReflectionSession) -> Result<(), DatabaseError>;

    /// Get a session by id.
    async fn get_session(&self, id: Uuid) -> Result<Option<ReflectionSession>, DatabaseError>;

    /// Advance a session's current round.
    async fn set_session_round(&self, id: Uuid, round: u32) -> Result<(), DatabaseError>;

    /// Mark a session completed.
    async fn complete_session(&self, id: Uuid) -> Result<(), DatabaseError>;

    // ── Reflection exchanges ────────────────────────────────────────

    /// Append an exchange. Exchanges are immutable once written and unique
    /// per (session, round).
    async fn insert_exchange(&self, exchange: &ReflectionExchange) -> Result<(), DatabaseError>;

    /// List a session's exchanges ordered by round.
    async fn list_exchanges(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ReflectionExchange>, DatabaseError>;

    // ── Actions ─────────────────────────────────────────────────────

    /// Insert a new action.
    async fn insert_action(&self, action: &Action) -> Result<(), DatabaseError>;

    /// Get an action by id.
    async fn get_action(&self, id: Uuid) -> Result<Option<Action>, DatabaseError>;

    /// Mark an action completed at `at`. Returns `false` if the action was
    /// already complete (completion is monotonic and idempotent).
    async fn complete_action(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Completion timestamps of all completed actions for an identity,
    /// across all of its dreams.
    async fn completed_action_times(
        &self,
        identity: &str,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError>;

    // ── Tiny steps ──────────────────────────────────────────────────

    /// Persist a decomposed breakdown. Steps are keyed by action id and
    /// unique per (action, index).
    async fn insert_tiny_steps(&self, steps: &[TinyStep]) -> Result<(), DatabaseError>;

    /// List an action's steps ordered by index.
    async fn list_tiny_steps(&self, action_id: Uuid) -> Result<Vec<TinyStep>, DatabaseError>;

    /// Mark a step completed. Returns `false` if it already was.
    async fn complete_tiny_step(&self, id: Uuid) -> Result<bool, DatabaseError>;
}
