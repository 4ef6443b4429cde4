use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB-backed storage operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Error raised by the MongoDB storage backend, one variant per operation.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save session `{id}`")]
    SaveSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session `{id}`")]
    LoadSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to look up session by code `{code}`")]
    LoadSessionByCode {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to complete session `{id}`")]
    CompleteSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to record score for session `{id}`")]
    RecordScore {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to create join identity in session `{session_id}`")]
    CreateJoin {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("join identity vanished after upsert in session `{session_id}`")]
    JoinVanished { session_id: Uuid },
    #[error("failed to load join identities in session `{session_id}`")]
    LoadJoins {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to update activity flag in session `{session_id}`")]
    UpdateActivity {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save answer in session `{session_id}`")]
    SaveAnswer {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load play rows in session `{session_id}`")]
    LoadRows {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load people for roster `{roster_id}`")]
    LoadPeople {
        roster_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to seed person `{id}`")]
    SeedPerson {
        id: Uuid,
        #[source]
        source: MongoError,
    },
}
