//! Question timer checkpoints for reconnecting players.
//!
//! When a player drops mid-question and rejoins with the same token, the
//! question clock must pick up where it left off instead of granting a fresh
//! window. Checkpoints are process-local and ephemeral; a server restart
//! simply hands out fresh timers.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// Identity a checkpoint is keyed on.
///
/// Keyed by join token rather than player name, so two players sharing a name
/// never inherit each other's clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeKey {
    pub session_id: Uuid,
    pub join_token: String,
}

/// A question in flight for one identity.
#[derive(Debug, Clone, Copy)]
pub struct QuestionCheckpoint {
    pub question_index: usize,
    pub started_at: Instant,
}

/// Outcome of a resume lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerResume {
    /// No checkpoint for this question; start a full timer window.
    Fresh,
    /// The question was already running; this much time is left.
    Resumed { remaining: Duration },
}

/// Concurrent map of in-flight question timers.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    entries: DashMap<ResumeKey, QuestionCheckpoint>,
}

impl CheckpointStore {
    /// Record that `question_index` started now for this identity.
    pub fn mark(&self, key: ResumeKey, question_index: usize) {
        self.mark_at(key, question_index, Instant::now());
    }

    fn mark_at(&self, key: ResumeKey, question_index: usize, started_at: Instant) {
        self.entries.insert(
            key,
            QuestionCheckpoint {
                question_index,
                started_at,
            },
        );
    }

    /// Current checkpoint for an identity, if any.
    pub fn checkpoint(&self, key: &ResumeKey) -> Option<QuestionCheckpoint> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Decide whether `question_index` continues a previous timer.
    ///
    /// Only a checkpoint for the same question counts; a checkpoint left
    /// behind by an earlier question means the player already moved past it.
    pub fn resume(&self, key: &ResumeKey, question_index: usize, limit: Duration) -> TimerResume {
        self.resume_at(key, question_index, limit, Instant::now())
    }

    fn resume_at(
        &self,
        key: &ResumeKey,
        question_index: usize,
        limit: Duration,
        now: Instant,
    ) -> TimerResume {
        match self.entries.get(key) {
            Some(entry) if entry.question_index == question_index => {
                let elapsed = now.saturating_duration_since(entry.started_at);
                TimerResume::Resumed {
                    remaining: limit.saturating_sub(elapsed),
                }
            }
            _ => TimerResume::Fresh,
        }
    }

    /// Drop the checkpoint for one identity.
    pub fn clear(&self, key: &ResumeKey) {
        self.entries.remove(key);
    }

    /// Drop every checkpoint belonging to a session.
    pub fn sweep_session(&self, session_id: Uuid) {
        self.entries.retain(|key, _| key.session_id != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(token: &str) -> ResumeKey {
        ResumeKey {
            session_id: Uuid::nil(),
            join_token: token.to_owned(),
        }
    }

    #[test]
    fn resume_same_question_subtracts_elapsed_time() {
        let store = CheckpointStore::default();
        let started = Instant::now();
        store.mark_at(key("tok"), 2, started);

        let now = started + Duration::from_secs(7);
        let outcome = store.resume_at(&key("tok"), 2, Duration::from_secs(20), now);

        assert_eq!(
            outcome,
            TimerResume::Resumed {
                remaining: Duration::from_secs(13)
            }
        );
    }

    #[test]
    fn resume_different_question_starts_fresh() {
        let store = CheckpointStore::default();
        store.mark(key("tok"), 2);

        let outcome = store.resume(&key("tok"), 3, Duration::from_secs(20));

        assert_eq!(outcome, TimerResume::Fresh);
    }

    #[test]
    fn resume_after_window_expired_reports_zero_remaining() {
        let store = CheckpointStore::default();
        let started = Instant::now();
        store.mark_at(key("tok"), 0, started);

        let now = started + Duration::from_secs(45);
        let outcome = store.resume_at(&key("tok"), 0, Duration::from_secs(20), now);

        assert_eq!(
            outcome,
            TimerResume::Resumed {
                remaining: Duration::ZERO
            }
        );
    }

    #[test]
    fn sweep_session_only_clears_that_session() {
        let store = CheckpointStore::default();
        let other = ResumeKey {
            session_id: Uuid::new_v4(),
            join_token: "tok".to_owned(),
        };
        store.mark(key("tok"), 0);
        store.mark(other.clone(), 1);

        store.sweep_session(Uuid::nil());

        assert!(store.checkpoint(&key("tok")).is_none());
        assert!(store.checkpoint(&other).is_some());
    }
}
