//! MongoDB-backed [`SessionStore`] implementation.

use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        KIND_ANSWER, KIND_JOIN, MongoPersonDocument, MongoPlayRowDocument, MongoSessionDocument,
        STATUS_ACTIVE, STATUS_COMPLETED, doc_id, uuid_as_binary,
    },
};
use crate::dao::{
    models::{PersonEntity, PlayRowEntity, SessionEntity},
    session_store::{JoinResolution, SessionStore},
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const PLAY_ROW_COLLECTION_NAME: &str = "play_rows";
const PERSON_COLLECTION_NAME: &str = "people";

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;
        info!(database = %config.database_name, "connected to MongoDB");

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        // One join sentinel per (session, token). The partial filter keeps
        // answer rows out of the uniqueness constraint.
        let row_collection = database.collection::<MongoPlayRowDocument>(PLAY_ROW_COLLECTION_NAME);
        let join_identity_index = IndexModel::builder()
            .keys(doc! { "session_id": 1, "join_token": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("join_identity_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! { "kind": KIND_JOIN }))
                    .build(),
            )
            .build();
        row_collection
            .create_index(join_identity_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAY_ROW_COLLECTION_NAME,
                index: "session_id,join_token",
                source,
            })?;

        let session_rows_index = IndexModel::builder()
            .keys(doc! { "session_id": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("session_rows_idx".to_owned()))
                    .build(),
            )
            .build();
        row_collection
            .create_index(session_rows_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAY_ROW_COLLECTION_NAME,
                index: "session_id,created_at",
                source,
            })?;

        // Code lookups always filter on status, so index both together.
        let session_collection =
            database.collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME);
        let session_code_index = IndexModel::builder()
            .keys(doc! { "code": 1, "status": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("session_code_idx".to_owned()))
                    .build(),
            )
            .build();
        session_collection
            .create_index(session_code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "code,status",
                source,
            })?;

        let person_collection = database.collection::<MongoPersonDocument>(PERSON_COLLECTION_NAME);
        let person_roster_index = IndexModel::builder()
            .keys(doc! { "roster_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("person_roster_idx".to_owned()))
                    .build(),
            )
            .build();
        person_collection
            .create_index(person_roster_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PERSON_COLLECTION_NAME,
                index: "roster_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn session_collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn row_collection(&self) -> Collection<MongoPlayRowDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayRowDocument>(PLAY_ROW_COLLECTION_NAME)
    }

    async fn person_collection(&self) -> Collection<MongoPersonDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPersonDocument>(PERSON_COLLECTION_NAME)
    }

    async fn save_session(&self, session: SessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        let collection = self.session_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;

        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn load_session_by_code(&self, code: String) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;

        let document = collection
            .find_one(doc! { "code": &code, "status": STATUS_ACTIVE })
            .await
            .map_err(|source| MongoDaoError::LoadSessionByCode { code, source })?;

        Ok(document.map(Into::into))
    }

    /// Flips the session to completed and returns the pre-update document, so
    /// callers can tell whether it was still active when the flip landed.
    async fn mark_session_completed(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;

        let before = collection
            .find_one_and_update(
                doc_id(id),
                doc! { "$set": { "status": STATUS_COMPLETED, "updated_at": DateTime::now() } },
            )
            .await
            .map_err(|source| MongoDaoError::CompleteSession { id, source })?;

        Ok(before.map(Into::into))
    }

    async fn save_session_score(&self, id: Uuid, score: u32) -> MongoResult<bool> {
        let collection = self.session_collection().await;

        let result = collection
            .update_one(
                doc_id(id),
                doc! { "$set": { "last_score": score as i64, "updated_at": DateTime::now() } },
            )
            .await
            .map_err(|source| MongoDaoError::RecordScore { id, source })?;

        Ok(result.matched_count > 0)
    }

    async fn upsert_join(&self, candidate: PlayRowEntity) -> MongoResult<JoinResolution> {
        let session_id = candidate.session_id;
        let candidate_id = candidate.id;
        let filter = doc! {
            "session_id": uuid_as_binary(session_id),
            "join_token": &candidate.join_token,
            "kind": KIND_JOIN,
        };
        let collection = self.row_collection().await;

        let outcome = collection
            .find_one_and_update(
                filter.clone(),
                doc! { "$setOnInsert": join_insert_fields(&candidate) },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        match outcome {
            Ok(Some(winner)) => {
                let row: PlayRowEntity = winner.into();
                if row.id == candidate_id {
                    Ok(JoinResolution::Created(row))
                } else {
                    Ok(JoinResolution::Existing(row))
                }
            }
            Ok(None) => self.reread_join(session_id, filter).await,
            // Concurrent upserts can still trip the unique index; the loser
            // re-reads the row the winner inserted.
            Err(err) if is_duplicate_key(&err) => self.reread_join(session_id, filter).await,
            Err(source) => Err(MongoDaoError::CreateJoin { session_id, source }),
        }
    }

    async fn reread_join(&self, session_id: Uuid, filter: Document) -> MongoResult<JoinResolution> {
        let collection = self.row_collection().await;

        let document = collection
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::CreateJoin { session_id, source })?;

        match document {
            Some(found) => Ok(JoinResolution::Existing(found.into())),
            None => Err(MongoDaoError::JoinVanished { session_id }),
        }
    }

    async fn load_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> MongoResult<Option<PlayRowEntity>> {
        let collection = self.row_collection().await;

        let document = collection
            .find_one(doc! {
                "session_id": uuid_as_binary(session_id),
                "join_token": &join_token,
                "kind": KIND_JOIN,
            })
            .await
            .map_err(|source| MongoDaoError::LoadJoins { session_id, source })?;

        Ok(document.map(Into::into))
    }

    async fn load_joins_for_player(
        &self,
        session_id: Uuid,
        player_name: String,
    ) -> MongoResult<Vec<PlayRowEntity>> {
        let collection = self.row_collection().await;

        let documents: Vec<MongoPlayRowDocument> = collection
            .find(doc! {
                "session_id": uuid_as_binary(session_id),
                "player_name": &player_name,
                "kind": KIND_JOIN,
            })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadJoins { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadJoins { session_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_join_activity(
        &self,
        session_id: Uuid,
        join_token: String,
        is_active: bool,
    ) -> MongoResult<bool> {
        let collection = self.row_collection().await;

        let result = collection
            .update_one(
                doc! {
                    "session_id": uuid_as_binary(session_id),
                    "join_token": &join_token,
                    "kind": KIND_JOIN,
                },
                doc! { "$set": { "is_active": is_active, "updated_at": DateTime::now() } },
            )
            .await
            .map_err(|source| MongoDaoError::UpdateActivity { session_id, source })?;

        Ok(result.matched_count > 0)
    }

    async fn save_answer(&self, row: PlayRowEntity) -> MongoResult<()> {
        let session_id = row.session_id;
        let document: MongoPlayRowDocument = row.into();
        let collection = self.row_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveAnswer { session_id, source })?;

        Ok(())
    }

    async fn load_answers_for_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> MongoResult<Vec<PlayRowEntity>> {
        let collection = self.row_collection().await;

        let documents: Vec<MongoPlayRowDocument> = collection
            .find(doc! {
                "session_id": uuid_as_binary(session_id),
                "join_token": &join_token,
                "kind": KIND_ANSWER,
            })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadRows { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRows { session_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn load_rows_for_session(&self, session_id: Uuid) -> MongoResult<Vec<PlayRowEntity>> {
        let collection = self.row_collection().await;

        let documents: Vec<MongoPlayRowDocument> = collection
            .find(doc! { "session_id": uuid_as_binary(session_id) })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadRows { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRows { session_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn load_people(&self, roster_id: Uuid) -> MongoResult<Vec<PersonEntity>> {
        let collection = self.person_collection().await;

        let documents: Vec<MongoPersonDocument> = collection
            .find(doc! { "roster_id": uuid_as_binary(roster_id) })
            .await
            .map_err(|source| MongoDaoError::LoadPeople { roster_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadPeople { roster_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_people(&self, people: Vec<PersonEntity>) -> MongoResult<()> {
        let collection = self.person_collection().await;

        for person in people {
            let id = person.id;
            let document: MongoPersonDocument = person.into();
            collection
                .replace_one(doc_id(id), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SeedPerson { id, source })?;
        }

        Ok(())
    }
}

/// `$setOnInsert` payload for a join upsert.
///
/// Built by hand rather than through serde so the filter fields and the
/// inserted fields cannot drift apart.
fn join_insert_fields(candidate: &PlayRowEntity) -> Document {
    doc! {
        "_id": uuid_as_binary(candidate.id),
        "session_id": uuid_as_binary(candidate.session_id),
        "join_token": &candidate.join_token,
        "kind": KIND_JOIN,
        "player_name": &candidate.player_name,
        "correct_person_id": Bson::Null,
        "selected_person_id": Bson::Null,
        "is_correct": candidate.is_correct,
        "response_time_ms": Bson::Null,
        "is_active": candidate.is_active,
        "created_at": DateTime::from_system_time(candidate.created_at),
        "updated_at": DateTime::from_system_time(candidate.updated_at),
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

impl SessionStore for MongoSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.save_session(session).await?) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_session(id).await?) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_session_by_code(code).await?) })
    }

    fn complete_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.mark_session_completed(id).await?) })
    }

    fn record_session_score(
        &self,
        id: Uuid,
        score: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.save_session_score(id, score).await?) })
    }

    fn create_join(
        &self,
        candidate: PlayRowEntity,
    ) -> BoxFuture<'static, StorageResult<JoinResolution>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.upsert_join(candidate).await?) })
    }

    fn find_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_join(session_id, join_token).await?) })
    }

    fn joins_for_player(
        &self,
        session_id: Uuid,
        player_name: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_joins_for_player(session_id, player_name).await?) })
    }

    fn set_join_activity(
        &self,
        session_id: Uuid,
        join_token: String,
        is_active: bool,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .save_join_activity(session_id, join_token, is_active)
                .await?)
        })
    }

    fn insert_answer(&self, row: PlayRowEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.save_answer(row).await?) })
    }

    fn answers_for_join(
        &self,
        session_id: Uuid,
        join_token: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_answers_for_join(session_id, join_token).await?) })
    }

    fn rows_for_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayRowEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_rows_for_session(session_id).await?) })
    }

    fn find_people(&self, roster_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PersonEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.load_people(roster_id).await?) })
    }

    fn seed_people(&self, people: Vec<PersonEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.save_people(people).await?) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.ping().await?) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            warn!("reinitializing MongoDB connection");
            Ok(store.inner.reconnect().await?)
        })
    }
}
