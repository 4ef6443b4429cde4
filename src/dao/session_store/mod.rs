/// Always-available in-memory backend, also used by tests.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{PersonEntity, PlayRowEntity, SessionEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Outcome of the atomic join insert-or-fetch.
///
/// Concurrent calls with the same `(session_id, join_token)` converge on a
/// single row: exactly one caller observes [`JoinResolution::Created`], every
/// other caller adopts the winning row through [`JoinResolution::Existing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResolution {
    /// The candidate row was inserted.
    Created(PlayRowEntity),
    /// A row with the same `(session_id, join_token)` already existed.
    Existing(PlayRowEntity),
}

impl JoinResolution {
    /// The join identity regardless of which caller created it.
    pub fn into_identity(self) -> PlayRowEntity {
        match self {
            JoinResolution::Created(row) | JoinResolution::Existing(row) => row,
        }
    }
}

/// Abstraction over the persistence layer for sessions, play rows, and rosters.
///
/// Per-token and per-session row reads return rows in creation order; callers
/// rely on that ordering for resume counting and display-name disambiguation.
pub trait SessionStore: Send + Sync {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Look up the active session carrying `code`. Completed sessions are
    /// invisible here, both to joins and to the code-minting collision check.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Flip the session to completed and return the row as it was before the
    /// flip, so callers can tell a fresh completion from a repeat.
    fn complete_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Overwrite the session's last-known score, last writer wins. Returns
    /// whether the session existed.
    fn record_session_score(
        &self,
        id: Uuid,
        score: u32,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Atomically insert the candidate join sentinel or fetch the row that
    /// beat it to the `(session_id, join_token)` slot.
    fn create_join(
        &self,
        candidate: PlayRowEntity,
    ) -> BoxFuture<'static, StorageResult<JoinResolution>>;
    fn find_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayRowEntity>>>;
    /// Join sentinels a player name has accumulated in a session, oldest first.
    fn joins_for_player(
        &self,
        session_id: Uuid,
        player_name: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>>;
    /// Update the durable liveness flag of a join identity. Returns whether
    /// the identity existed.
    fn set_join_activity(
        &self,
        session_id: Uuid,
        join_token: String,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn insert_answer(&self, answer: PlayRowEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Answer outcomes recorded under a join token, oldest first.
    fn answers_for_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>>;
    /// Every play row of a session (sentinels and answers), oldest first.
    fn rows_for_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>>;

    fn find_people(&self, roster_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PersonEntity>>>;
    /// Install roster fixtures, replacing people that already exist by id.
    fn seed_people(&self, people: Vec<PersonEntity>) -> BoxFuture<'static, StorageResult<()>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
