//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and safe
//! for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::model::{ReflectionExchange, ReflectionSession, SessionStatus};
use crate::profile::model::{Dream, Profile};
use crate::steps::model::{Action, TinyStep};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn status_to_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::InProgress => "in_progress",
        SessionStatus::Completed => "completed",
    }
}

fn str_to_status(s: &str) -> SessionStatus {
    match s {
        "completed" => SessionStatus::Completed,
        _ => SessionStatus::InProgress,
    }
}

/// Column order: 0:id, 1:name, 2:dream, 3:stuck_point,
/// 4:onboarding_completed, 5:created_at, 6:updated_at
const PROFILE_COLUMNS: &str =
    "id, name, dream, stuck_point, onboarding_completed, created_at, updated_at";

fn row_to_profile(row: &libsql::Row) -> Result<Profile, libsql::Error> {
    let id: String = row.get(0)?;
    let name: Option<String> = row.get::<String>(1).ok();
    let dream: Option<String> = row.get::<String>(2).ok();
    let stuck_point: Option<String> = row.get::<String>(3).ok();
    let completed: i64 = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(Profile {
        id,
        name,
        dream,
        stuck_point,
        onboarding_completed: completed != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Column order: 0:id, 1:profile_id, 2:title, 3:category, 4:active,
/// 5:core_motivation, 6:five_whys_completed, 7:created_at, 8:updated_at
const DREAM_COLUMNS: &str =
    "id, profile_id, title, category, active, core_motivation, five_whys_completed, created_at, updated_at";

fn row_to_dream(row: &libsql::Row) -> Result<Dream, libsql::Error> {
    let id_str: String = row.get(0)?;
    let profile_id: String = row.get(1)?;
    let title: String = row.get(2)?;
    let category: String = row.get(3)?;
    let active: i64 = row.get(4)?;
    let core_motivation: Option<String> = row.get::<String>(5).ok();
    let five_whys: i64 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(Dream {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        profile_id,
        title,
        category,
        active: active != 0,
        core_motivation,
        five_whys_completed: five_whys != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Column order: 0:id, 1:profile_id, 2:dream_id, 3:status, 4:current_round,
/// 5:created_at, 6:updated_at
const SESSION_COLUMNS: &str =
    "id, profile_id, dream_id, status, current_round, created_at, updated_at";

fn row_to_session(row: &libsql::Row) -> Result<ReflectionSession, libsql::Error> {
    let id_str: String = row.get(0)?;
    let profile_id: String = row.get(1)?;
    let dream_id_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let round: i64 = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(ReflectionSession {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        profile_id,
        dream_id: Uuid::parse_str(&dream_id_str).unwrap_or_else(|_| Uuid::nil()),
        status: str_to_status(&status_str),
        current_round: round as u32,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Column order: 0:id, 1:session_id, 2:round, 3:question, 4:answer,
/// 5:reflection, 6:created_at
const EXCHANGE_COLUMNS: &str = "id, session_id, round, question, answer, reflection, created_at";

fn row_to_exchange(row: &libsql::Row) -> Result<ReflectionExchange, libsql::Error> {
    let id_str: String = row.get(0)?;
    let session_id_str: String = row.get(1)?;
    let round: i64 = row.get(2)?;
    let question: String = row.get(3)?;
    let answer: String = row.get(4)?;
    let reflection: Option<String> = row.get::<String>(5).ok();
    let created_str: String = row.get(6)?;

    Ok(ReflectionExchange {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        session_id: Uuid::parse_str(&session_id_str).unwrap_or_else(|_| Uuid::nil()),
        round: round as u32,
        question,
        answer,
        reflection,
        created_at: parse_datetime(&created_str),
    })
}

/// Column order: 0:id, 1:dream_id, 2:title, 3:description,
/// 4:duration_estimate, 5:category, 6:completed, 7:completed_at,
/// 8:created_at, 9:updated_at
const ACTION_COLUMNS: &str =
    "id, dream_id, title, description, duration_estimate, category, completed, completed_at, created_at, updated_at";

fn row_to_action(row: &libsql::Row) -> Result<Action, libsql::Error> {
    let id_str: String = row.get(0)?;
    let dream_id_str: String = row.get(1)?;
    let title: String = row.get(2)?;
    let description: Option<String> = row.get::<String>(3).ok();
    let duration_estimate: Option<String> = row.get::<String>(4).ok();
    let category: Option<String> = row.get::<String>(5).ok();
    let completed: i64 = row.get(6)?;
    let completed_at: Option<String> = row.get::<String>(7).ok();
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(Action {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        dream_id: Uuid::parse_str(&dream_id_str).unwrap_or_else(|_| Uuid::nil()),
        title,
        description,
        duration_estimate,
        category,
        completed: completed != 0,
        completed_at: completed_at.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Column order: 0:id, 1:action_id, 2:idx, 3:title, 4:description,
/// 5:completed, 6:created_at
const STEP_COLUMNS: &str = "id, action_id, idx, title, description, completed, created_at";

fn row_to_step(row: &libsql::Row) -> Result<TinyStep, libsql::Error> {
    let id_str: String = row.get(0)?;
    let action_id_str: String = row.get(1)?;
    let idx: i64 = row.get(2)?;
    let title: String = row.get(3)?;
    let description: String = row.get(4).unwrap_or_default();
    let completed: i64 = row.get(5)?;
    let created_str: String = row.get(6)?;

    Ok(TinyStep {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        action_id: Uuid::parse_str(&action_id_str).unwrap_or_else(|_| Uuid::nil()),
        index: idx as u32,
        title,
        description,
        completed: completed != 0,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, identity: &str) -> Result<Option<Profile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let profile = row_to_profile(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(profile))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn create_profile_if_absent(&self, identity: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO profiles (id, created_at, updated_at)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT (id) DO NOTHING",
                params![identity, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_profile_if_absent: {e}")))?;
        Ok(())
    }

    async fn update_profile_draft(
        &self,
        identity: &str,
        name: Option<&str>,
        stuck_point: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE profiles SET
                     name = COALESCE(?2, name),
                     stuck_point = COALESCE(?3, stuck_point),
                     updated_at = ?4
                 WHERE id = ?1",
                params![identity, opt_text(name), opt_text(stuck_point), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_profile_draft: {e}")))?;

        debug!(identity, "Profile draft applied");
        Ok(())
    }

    async fn set_onboarding_completed(&self, identity: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE profiles SET onboarding_completed = 1, updated_at = ?2 WHERE id = ?1",
                params![identity, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_onboarding_completed: {e}")))?;
        Ok(())
    }

    // ── Dreams ──────────────────────────────────────────────────────

    async fn insert_dream(&self, dream: &Dream) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO dreams ({DREAM_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    dream.id.to_string(),
                    dream.profile_id.as_str(),
                    dream.title.as_str(),
                    dream.category.as_str(),
                    dream.active as i64,
                    opt_text(dream.core_motivation.as_deref()),
                    dream.five_whys_completed as i64,
                    dream.created_at.to_rfc3339(),
                    dream.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_dream: {e}")))?;

        debug!(dream_id = %dream.id, title = %dream.title, "Dream created");
        Ok(())
    }

    async fn find_active_dream(&self, identity: &str) -> Result<Option<Dream>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DREAM_COLUMNS} FROM dreams
                     WHERE profile_id = ?1 AND active = 1
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_active_dream: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let dream = row_to_dream(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(dream))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_active_dream: {e}"))),
        }
    }

    async fn set_dream_motivation(
        &self,
        dream_id: Uuid,
        motivation: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE dreams SET core_motivation = ?2, five_whys_completed = 1, updated_at = ?3
                 WHERE id = ?1",
                params![dream_id.to_string(), motivation, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_dream_motivation: {e}")))?;
        Ok(())
    }

    // ── Reflection sessions ─────────────────────────────────────────

    async fn insert_session(&self, session: &ReflectionSession) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO reflection_sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    session.id.to_string(),
                    session.profile_id.as_str(),
                    session.dream_id.to_string(),
                    status_to_str(session.status),
                    session.current_round as i64,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_session: {e}")))?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<ReflectionSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM reflection_sessions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let session = row_to_session(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn set_session_round(&self, id: Uuid, round: u32) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        // Monotonic: the round never moves backward.
        self.conn()
            .execute(
                "UPDATE reflection_sessions SET current_round = ?2, updated_at = ?3
                 WHERE id = ?1 AND current_round < ?2",
                params![id.to_string(), round as i64, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_session_round: {e}")))?;
        Ok(())
    }

    async fn complete_session(&self, id: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE reflection_sessions SET status = 'completed', updated_at = ?2
                 WHERE id = ?1",
                params![id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_session: {e}")))?;

        debug!(session_id = %id, "Session completed");
        Ok(())
    }

    // ── Reflection exchanges ────────────────────────────────────────

    async fn insert_exchange(&self, exchange: &ReflectionExchange) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO reflection_exchanges ({EXCHANGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    exchange.id.to_string(),
                    exchange.session_id.to_string(),
                    exchange.round as i64,
                    exchange.question.as_str(),
                    exchange.answer.as_str(),
                    opt_text(exchange.reflection.as_deref()),
                    exchange.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_exchange: {e}")))?;

        debug!(session_id = %exchange.session_id, round = exchange.round, "Exchange persisted");
        Ok(())
    }

    async fn list_exchanges(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ReflectionExchange>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EXCHANGE_COLUMNS} FROM reflection_exchanges
                     WHERE session_id = ?1 ORDER BY round ASC"
                ),
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_exchanges: {e}")))?;

        let mut exchanges = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_exchange(&row) {
                Ok(exchange) => exchanges.push(exchange),
                Err(e) => {
                    tracing::warn!("Skipping exchange row: {e}");
                }
            }
        }
        Ok(exchanges)
    }

    // ── Actions ─────────────────────────────────────────────────────

    async fn insert_action(&self, action: &Action) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO actions ({ACTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    action.id.to_string(),
                    action.dream_id.to_string(),
                    action.title.as_str(),
                    opt_text(action.description.as_deref()),
                    opt_text(action.duration_estimate.as_deref()),
                    opt_text(action.category.as_deref()),
                    action.completed as i64,
                    opt_text(action.completed_at.map(|t| t.to_rfc3339()).as_deref()),
                    action.created_at.to_rfc3339(),
                    action.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_action: {e}")))?;
        Ok(())
    }

    async fn get_action(&self, id: Uuid) -> Result<Option<Action>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_action: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let action = row_to_action(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(action))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_action: {e}"))),
        }
    }

    async fn complete_action(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE actions SET completed = 1, completed_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND completed = 0",
                params![id.to_string(), at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_action: {e}")))?;

        if changed > 0 {
            debug!(action_id = %id, "Action completed");
        }
        Ok(changed > 0)
    }

    async fn completed_action_times(
        &self,
        identity: &str,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT a.completed_at FROM actions a
                 JOIN dreams d ON a.dream_id = d.id
                 WHERE d.profile_id = ?1 AND a.completed = 1 AND a.completed_at IS NOT NULL
                 ORDER BY a.completed_at ASC",
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("completed_action_times: {e}")))?;

        let mut times = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let ts: String = row.get(0).unwrap_or_default();
            times.push(parse_datetime(&ts));
        }
        Ok(times)
    }

    // ── Tiny steps ──────────────────────────────────────────────────

    async fn insert_tiny_steps(&self, steps: &[TinyStep]) -> Result<(), DatabaseError> {
        for step in steps {
            self.conn()
                .execute(
                    &format!(
                        "INSERT INTO tiny_steps ({STEP_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                    ),
                    params![
                        step.id.to_string(),
                        step.action_id.to_string(),
                        step.index as i64,
                        step.title.as_str(),
                        step.description.as_str(),
                        step.completed as i64,
                        step.created_at.to_rfc3339(),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("insert_tiny_steps: {e}")))?;
        }
        Ok(())
    }

    async fn list_tiny_steps(&self, action_id: Uuid) -> Result<Vec<TinyStep>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM tiny_steps
                     WHERE action_id = ?1 ORDER BY idx ASC"
                ),
                params![action_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tiny_steps: {e}")))?;

        let mut steps = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_step(&row) {
                Ok(step) => steps.push(step),
                Err(e) => {
                    tracing::warn!("Skipping tiny step row: {e}");
                }
            }
        }
        Ok(steps)
    }

    async fn complete_tiny_step(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE tiny_steps SET completed = 1 WHERE id = ?1 AND completed = 0",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_tiny_step: {e}")))?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn profile_create_is_idempotent() {
        let db = test_db().await;

        db.create_profile_if_absent("id-1").await.unwrap();
        db.update_profile_draft("id-1", Some("Alex"), None)
            .await
            .unwrap();
        // A racing second create must not clobber or fail.
        db.create_profile_if_absent("id-1").await.unwrap();

        let profile = db.get_profile("id-1").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alex"));
    }

    #[tokio::test]
    async fn profile_draft_update_keeps_unset_fields() {
        let db = test_db().await;
        db.create_profile_if_absent("id-1").await.unwrap();

        db.update_profile_draft("id-1", Some("Alex"), Some("time"))
            .await
            .unwrap();
        // Updating with None must not null out existing values.
        db.update_profile_draft("id-1", None, None).await.unwrap();

        let profile = db.get_profile("id-1").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alex"));
        assert_eq!(profile.stuck_point.as_deref(), Some("time"));
    }

    #[tokio::test]
    async fn dream_roundtrip_and_active_lookup() {
        let db = test_db().await;
        db.create_profile_if_absent("id-1").await.unwrap();

        assert!(db.find_active_dream("id-1").await.unwrap().is_none());

        let dream = Dream::new("id-1", "Run a marathon", "wellness");
        db.insert_dream(&dream).await.unwrap();

        let found = db.find_active_dream("id-1").await.unwrap().unwrap();
        assert_eq!(found.id, dream.id);
        assert_eq!(found.title, "Run a marathon");
        assert!(found.active);
        assert!(!found.five_whys_completed);

        db.set_dream_motivation(dream.id, "Because health enables everything else")
            .await
            .unwrap();
        let found = db.find_active_dream("id-1").await.unwrap().unwrap();
        assert!(found.five_whys_completed);
        assert_eq!(
            found.core_motivation.as_deref(),
            Some("Because health enables everything else")
        );
    }

    #[tokio::test]
    async fn session_round_is_monotonic() {
        let db = test_db().await;
        db.create_profile_if_absent("id-1").await.unwrap();
        let dream = Dream::new("id-1", "D", "c");
        db.insert_dream(&dream).await.unwrap();

        let session = ReflectionSession::new("id-1", dream.id);
        db.insert_session(&session).await.unwrap();

        db.set_session_round(session.id, 3).await.unwrap();
        // A stale write with a lower round is ignored.
        db.set_session_round(session.id, 1).await.unwrap();

        let found = db.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(found.current_round, 3);
        assert_eq!(found.status, SessionStatus::InProgress);

        db.complete_session(session.id).await.unwrap();
        let found = db.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn exchanges_are_ordered_and_unique_per_round() {
        let db = test_db().await;
        let session_id = Uuid::new_v4();

        for round in [2u32, 1, 3] {
            let exchange = ReflectionExchange::new(
                session_id,
                round,
                format!("q{round}"),
                format!("a{round}"),
            );
            db.insert_exchange(&exchange).await.unwrap();
        }

        let exchanges = db.list_exchanges(session_id).await.unwrap();
        assert_eq!(
            exchanges.iter().map(|e| e.round).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let duplicate = ReflectionExchange::new(session_id, 2, "dup", "dup");
        assert!(db.insert_exchange(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn action_completion_is_idempotent() {
        let db = test_db().await;
        db.create_profile_if_absent("id-1").await.unwrap();
        let dream = Dream::new("id-1", "D", "c");
        db.insert_dream(&dream).await.unwrap();

        let action = Action::new(dream.id, "First run");
        db.insert_action(&action).await.unwrap();

        let now = Utc::now();
        assert!(db.complete_action(action.id, now).await.unwrap());
        assert!(!db.complete_action(action.id, now).await.unwrap());

        let times = db.completed_action_times("id-1").await.unwrap();
        assert_eq!(times.len(), 1);
    }

    #[tokio::test]
    async fn tiny_steps_roundtrip() {
        let db = test_db().await;
        let action_id = Uuid::new_v4();

        let steps = vec![
            TinyStep::new(action_id, 0, "Set a 2-minute timer", ""),
            TinyStep::new(action_id, 1, "Put on shoes", "by the door"),
            TinyStep::new(action_id, 2, "Step outside", ""),
        ];
        db.insert_tiny_steps(&steps).await.unwrap();

        let listed = db.list_tiny_steps(action_id).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[1].description, "by the door");

        assert!(db.complete_tiny_step(steps[0].id).await.unwrap());
        assert!(!db.complete_tiny_step(steps[0].id).await.unwrap());

        let listed = db.list_tiny_steps(action_id).await.unwrap();
        assert!(listed[0].completed);
        assert!(!listed[1].completed);
    }
}
