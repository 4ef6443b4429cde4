use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{PersonEntity, PlayRowEntity, SessionEntity, SessionStatus},
    session_store::{JoinResolution, SessionStore},
    storage::StorageResult,
};

/// In-memory storage backend.
///
/// Serves demo deployments without a database and doubles as the store used
/// by tests. Write operations take the inner lock exclusively, which makes
/// [`SessionStore::create_join`] genuinely atomic: the uniqueness check and
/// the insert happen under one guard.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: IndexMap<Uuid, SessionEntity>,
    people: IndexMap<Uuid, PersonEntity>,
    /// Play rows in insertion order; insertion order is creation order.
    rows: IndexMap<Uuid, PlayRowEntity>,
    /// Unique index over join sentinels, keyed by `(session_id, join_token)`.
    join_index: HashMap<(Uuid, String), Uuid>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert_session(&self, session: SessionEntity) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> StorageResult<Option<SessionEntity>> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(&id).cloned())
    }

    async fn find_session_by_code(&self, code: String) -> StorageResult<Option<SessionEntity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .find(|session| session.status == SessionStatus::Active && session.code == code)
            .cloned())
    }

    async fn complete_session(&self, id: Uuid) -> StorageResult<Option<SessionEntity>> {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(None);
        };

        let before = session.clone();
        session.status = SessionStatus::Completed;
        session.updated_at = SystemTime::now();
        Ok(Some(before))
    }

    async fn record_session_score(&self, id: Uuid, score: u32) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(false);
        };

        session.last_score = Some(score);
        session.updated_at = SystemTime::now();
        Ok(true)
    }

    async fn create_join(&self, candidate: PlayRowEntity) -> StorageResult<JoinResolution> {
        let mut inner = self.inner.write().await;
        let key = (candidate.session_id, candidate.join_token.clone());

        if let Some(existing) = inner
            .join_index
            .get(&key)
            .and_then(|id| inner.rows.get(id))
        {
            return Ok(JoinResolution::Existing(existing.clone()));
        }

        inner.join_index.insert(key, candidate.id);
        inner.rows.insert(candidate.id, candidate.clone());
        Ok(JoinResolution::Created(candidate))
    }

    async fn find_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> StorageResult<Option<PlayRowEntity>> {
        let inner = self.inner.read().await;
        let row = inner
            .join_index
            .get(&(session_id, join_token))
            .and_then(|id| inner.rows.get(id))
            .cloned();
        Ok(row)
    }

    async fn joins_for_player(
        &self,
        session_id: Uuid,
        player_name: String,
    ) -> StorageResult<Vec<PlayRowEntity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|row| {
                row.is_join_sentinel()
                    && row.session_id == session_id
                    && row.player_name == player_name
            })
            .cloned()
            .collect())
    }

    async fn set_join_activity(
        &self,
        session_id: Uuid,
        join_token: String,
        active: bool,
    ) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(row_id) = inner.join_index.get(&(session_id, join_token)).copied() else {
            return Ok(false);
        };

        let Some(row) = inner.rows.get_mut(&row_id) else {
            return Ok(false);
        };
        row.is_active = active;
        row.updated_at = SystemTime::now();
        Ok(true)
    }

    async fn insert_answer(&self, answer: PlayRowEntity) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.rows.insert(answer.id, answer);
        Ok(())
    }

    async fn answers_for_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> StorageResult<Vec<PlayRowEntity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|row| {
                !row.is_join_sentinel()
                    && row.session_id == session_id
                    && row.join_token == join_token
            })
            .cloned()
            .collect())
    }

    async fn rows_for_session(&self, session_id: Uuid) -> StorageResult<Vec<PlayRowEntity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|row| row.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn find_people(&self, roster_id: Uuid) -> StorageResult<Vec<PersonEntity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .people
            .values()
            .filter(|person| person.roster_id == roster_id)
            .cloned()
            .collect())
    }

    async fn seed_people(&self, people: Vec<PersonEntity>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        for person in people {
            inner.people.insert(person.id, person);
        }
        Ok(())
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session_by_code(code).await })
    }

    fn complete_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.complete_session(id).await })
    }

    fn record_session_score(&self, id: Uuid, score: u32) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.record_session_score(id, score).await })
    }

    fn create_join(
        &self,
        candidate: PlayRowEntity,
    ) -> BoxFuture<'static, StorageResult<JoinResolution>> {
        let store = self.clone();
        Box::pin(async move { store.create_join(candidate).await })
    }

    fn find_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_join(session_id, join_token).await })
    }

    fn joins_for_player(
        &self,
        session_id: Uuid,
        player_name: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.joins_for_player(session_id, player_name).await })
    }

    fn set_join_activity(
        &self,
        session_id: Uuid,
        join_token: String,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.set_join_activity(session_id, join_token, active).await })
    }

    fn insert_answer(&self, answer: PlayRowEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_answer(answer).await })
    }

    fn answers_for_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.answers_for_join(session_id, join_token).await })
    }

    fn rows_for_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.rows_for_session(session_id).await })
    }

    fn find_people(&self, roster_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PersonEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_people(roster_id).await })
    }

    fn seed_people(&self, people: Vec<PersonEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.seed_people(people).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::QuestionKind;

    fn sample_session(code: &str) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            roster_id: Uuid::new_v4(),
            code: code.to_owned(),
            question_kind: QuestionKind::NameToPhoto,
            status: SessionStatus::Active,
            total_questions: 5,
            time_limit_seconds: 20,
            options_count: 4,
            last_score: None,
            host_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn concurrent_create_join_converges_on_one_row() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();

        let first = PlayRowEntity::new_join(session_id, "Sam".into(), "token-c".into());
        let second = PlayRowEntity::new_join(session_id, "Sam".into(), "token-c".into());

        let (left, right) = tokio::join!(store.create_join(first), store.create_join(second));
        let left = left.expect("left create");
        let right = right.expect("right create");

        let created = matches!(left, JoinResolution::Created(_)) as usize
            + matches!(right, JoinResolution::Created(_)) as usize;
        assert_eq!(created, 1, "exactly one caller must win the insert");
        assert_eq!(
            left.into_identity().id,
            right.into_identity().id,
            "both callers must adopt the same row"
        );

        let rows = store.rows_for_session(session_id).await.expect("rows");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn answers_come_back_in_creation_order() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();
        let token = "token-a".to_string();

        let targets: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for target in &targets {
            store
                .insert_answer(PlayRowEntity::new_answer(
                    session_id,
                    token.clone(),
                    "Sam".into(),
                    *target,
                    Some(*target),
                    500,
                ))
                .await
                .expect("insert answer");
        }

        let answers = store
            .answers_for_join(session_id, token)
            .await
            .expect("answers");
        let seen: Vec<Uuid> = answers
            .iter()
            .filter_map(|row| row.correct_person_id)
            .collect();
        assert_eq!(seen, targets);
    }

    #[tokio::test]
    async fn joins_for_player_only_returns_that_players_sentinels() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();

        store
            .create_join(PlayRowEntity::new_join(
                session_id,
                "Sam".into(),
                "token-a".into(),
            ))
            .await
            .expect("join a");
        store
            .create_join(PlayRowEntity::new_join(
                session_id,
                "Alex".into(),
                "token-b".into(),
            ))
            .await
            .expect("join b");
        store
            .insert_answer(PlayRowEntity::new_answer(
                session_id,
                "token-a".into(),
                "Sam".into(),
                Uuid::new_v4(),
                None,
                20_000,
            ))
            .await
            .expect("answer");

        let joins = store
            .joins_for_player(session_id, "Sam".into())
            .await
            .expect("joins");
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].join_token, "token-a");
        assert!(joins[0].is_join_sentinel());
    }

    #[tokio::test]
    async fn completed_sessions_are_invisible_to_code_lookup() {
        let store = MemorySessionStore::new();
        let session = sample_session("AB23CD");
        let id = session.id;
        store.insert_session(session).await.expect("insert");

        let found = store
            .find_session_by_code("AB23CD".into())
            .await
            .expect("lookup");
        assert!(found.is_some());

        let before = store
            .complete_session(id)
            .await
            .expect("complete")
            .expect("session exists");
        assert_eq!(before.status, SessionStatus::Active);

        let after_complete = store
            .find_session_by_code("AB23CD".into())
            .await
            .expect("lookup");
        assert!(after_complete.is_none());

        // a repeat completion reports the already-completed state
        let repeat = store
            .complete_session(id)
            .await
            .expect("complete again")
            .expect("session exists");
        assert_eq!(repeat.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn activity_flag_updates_only_existing_identities() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();
        store
            .create_join(PlayRowEntity::new_join(
                session_id,
                "Sam".into(),
                "token-a".into(),
            ))
            .await
            .expect("join");

        let flipped = store
            .set_join_activity(session_id, "token-a".into(), false)
            .await
            .expect("flip");
        assert!(flipped);

        let row = store
            .find_join(session_id, "token-a".into())
            .await
            .expect("find")
            .expect("row exists");
        assert!(!row.is_active);

        let missing = store
            .set_join_activity(session_id, "token-z".into(), false)
            .await
            .expect("flip missing");
        assert!(!missing);
    }
}
