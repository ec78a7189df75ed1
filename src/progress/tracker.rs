//! ProgressTracker — records action completions and derives streaks.
//!
//! Streaks are never stored. They are recomputed from completion timestamps
//! on every read, bucketed into calendar days in the user's local offset, so
//! a clock change or a backfilled completion can only improve accuracy.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Utc};
use tracing::info;

use crate::error::StepError;
use crate::store::Database;

/// Aggregate view of a profile's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed_actions: usize,
    /// Consecutive days ending today (or yesterday) with at least one
    /// completion.
    pub current_streak: u32,
    pub longest_streak: u32,
}

pub struct ProgressTracker {
    db: Arc<dyn Database>,
    offset: FixedOffset,
}

impl ProgressTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        let offset = *Local::now().offset();
        Self { db, offset }
    }

    /// Override the day-bucketing offset.
    pub fn with_offset(db: Arc<dyn Database>, offset: FixedOffset) -> Self {
        Self { db, offset }
    }

    /// Mark an action complete. Returns `false` when it already was, so a
    /// double tap never counts twice.
    pub async fn record_completion(&self, action_id: uuid::Uuid) -> Result<bool, StepError> {
        let newly = self.db.complete_action(action_id, Utc::now()).await?;
        if newly {
            info!(action_id = %action_id, "Action completion recorded");
        }
        Ok(newly)
    }

    /// Current progress for a profile, streaks included.
    pub async fn snapshot(&self, profile_id: &str) -> Result<ProgressSnapshot, StepError> {
        let times = self.db.completed_action_times(profile_id).await?;
        let days: BTreeSet<NaiveDate> = times
            .iter()
            .map(|t| t.with_timezone(&self.offset).date_naive())
            .collect();
        let today = Utc::now().with_timezone(&self.offset).date_naive();
        let (current_streak, longest_streak) = streaks(&days, today);
        Ok(ProgressSnapshot {
            completed_actions: times.len(),
            current_streak,
            longest_streak,
        })
    }
}

/// Compute `(current, longest)` streaks over a set of active days.
///
/// The current streak counts back from `today`, or from yesterday when today
/// has no completion yet (an open day does not break the streak).
fn streaks(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> (u32, u32) {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        run = match prev {
            Some(p) if day == p + Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(day);
    }

    let mut current = 0u32;
    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    while days.contains(&cursor) {
        current += 1;
        cursor -= Duration::days(1);
    }

    (current, longest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::model::Dream;
    use crate::steps::model::Action;
    use crate::store::LibSqlBackend;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn day_set(dates: &[&str]) -> BTreeSet<NaiveDate> {
        dates.iter().map(|d| date(d)).collect()
    }

    #[test]
    fn streaks_empty_history() {
        assert_eq!(streaks(&BTreeSet::new(), date("2026-08-27")), (0, 0));
    }

    #[test]
    fn streak_broken_by_gap() {
        // Completions on day 1, 2, 3, a gap, then day 6 (today).
        let days = day_set(&["2026-08-01", "2026-08-02", "2026-08-03", "2026-08-06"]);
        assert_eq!(streaks(&days, date("2026-08-06")), (1, 3));
    }

    #[test]
    fn open_day_does_not_break_streak() {
        // Nothing yet today, but yesterday and the day before are active.
        let days = day_set(&["2026-08-25", "2026-08-26"]);
        assert_eq!(streaks(&days, date("2026-08-27")), (2, 2));
    }

    #[test]
    fn stale_history_has_no_current_streak() {
        let days = day_set(&["2026-08-20", "2026-08-21", "2026-08-22"]);
        assert_eq!(streaks(&days, date("2026-08-27")), (0, 3));
    }

    #[test]
    fn single_day_today() {
        let days = day_set(&["2026-08-27"]);
        assert_eq!(streaks(&days, date("2026-08-27")), (1, 1));
    }

    async fn seeded_actions(db: &Arc<dyn Database>, count: usize) -> Vec<Action> {
        db.create_profile_if_absent("id-1").await.unwrap();
        let dream = Dream::new("id-1", "Run a marathon", "wellness");
        db.insert_dream(&dream).await.unwrap();
        let mut actions = Vec::new();
        for i in 0..count {
            let action = Action::new(dream.id, format!("action {i}"));
            db.insert_action(&action).await.unwrap();
            actions.push(action);
        }
        actions
    }

    #[tokio::test]
    async fn record_completion_is_idempotent() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let actions = seeded_actions(&db, 1).await;
        let tracker = ProgressTracker::new(Arc::clone(&db));

        assert!(tracker.record_completion(actions[0].id).await.unwrap());
        assert!(!tracker.record_completion(actions[0].id).await.unwrap());

        let snapshot = tracker.snapshot("id-1").await.unwrap();
        assert_eq!(snapshot.completed_actions, 1);
    }

    #[tokio::test]
    async fn snapshot_counts_todays_completions() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let actions = seeded_actions(&db, 2).await;
        let tracker = ProgressTracker::new(Arc::clone(&db));

        tracker.record_completion(actions[0].id).await.unwrap();
        tracker.record_completion(actions[1].id).await.unwrap();

        let snapshot = tracker.snapshot("id-1").await.unwrap();
        assert_eq!(snapshot.completed_actions, 2);
        // Both completions landed today.
        assert_eq!(snapshot.current_streak, 1);
        assert_eq!(snapshot.longest_streak, 1);
    }

    #[tokio::test]
    async fn snapshot_of_unknown_profile_is_empty() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let tracker = ProgressTracker::new(Arc::clone(&db));
        let snapshot = tracker.snapshot("nobody").await.unwrap();
        assert_eq!(
            snapshot,
            ProgressSnapshot {
                completed_actions: 0,
                current_streak: 0,
                longest_streak: 0
            }
        );
    }
}
