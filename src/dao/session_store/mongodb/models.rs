use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    Gender, PersonEntity, PlayRowEntity, QuestionKind, SessionEntity, SessionStatus,
};

/// Discriminator value stored on join sentinel rows.
pub const KIND_JOIN: &str = "join";
/// Discriminator value stored on answer outcome rows.
pub const KIND_ANSWER: &str = "answer";
/// Wire value of [`SessionStatus::Active`], used in query filters.
pub const STATUS_ACTIVE: &str = "active";
/// Wire value of [`SessionStatus::Completed`], used in status updates.
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    roster_id: Uuid,
    code: String,
    question_kind: QuestionKind,
    status: SessionStatus,
    total_questions: u32,
    time_limit_seconds: u32,
    options_count: u32,
    last_score: Option<u32>,
    host_token: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            roster_id: value.roster_id,
            code: value.code,
            question_kind: value.question_kind,
            status: value.status,
            total_questions: value.total_questions,
            time_limit_seconds: value.time_limit_seconds,
            options_count: value.options_count,
            last_score: value.last_score,
            host_token: value.host_token,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: value.id,
            roster_id: value.roster_id,
            code: value.code,
            question_kind: value.question_kind,
            status: value.status,
            total_questions: value.total_questions,
            time_limit_seconds: value.time_limit_seconds,
            options_count: value.options_count,
            last_score: value.last_score,
            host_token: value.host_token,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Shared participation row. The `kind` field mirrors the sentinel rule so the
/// partial unique index and query filters can discriminate without inspecting
/// `correct_person_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayRowDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    session_id: Uuid,
    join_token: String,
    player_name: String,
    kind: String,
    correct_person_id: Option<Uuid>,
    selected_person_id: Option<Uuid>,
    is_correct: bool,
    response_time_ms: Option<i64>,
    is_active: bool,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<PlayRowEntity> for MongoPlayRowDocument {
    fn from(value: PlayRowEntity) -> Self {
        let kind = if value.is_join_sentinel() {
            KIND_JOIN
        } else {
            KIND_ANSWER
        };
        Self {
            id: value.id,
            session_id: value.session_id,
            join_token: value.join_token,
            player_name: value.player_name,
            kind: kind.to_owned(),
            correct_person_id: value.correct_person_id,
            selected_person_id: value.selected_person_id,
            is_correct: value.is_correct,
            response_time_ms: value.response_time_ms.map(|ms| ms as i64),
            is_active: value.is_active,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoPlayRowDocument> for PlayRowEntity {
    fn from(value: MongoPlayRowDocument) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            join_token: value.join_token,
            player_name: value.player_name,
            correct_person_id: value.correct_person_id,
            selected_person_id: value.selected_person_id,
            is_correct: value.is_correct,
            response_time_ms: value.response_time_ms.map(|ms| ms.max(0) as u64),
            is_active: value.is_active,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPersonDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    roster_id: Uuid,
    first_name: String,
    last_name: String,
    gender: Gender,
    photo_url: String,
}

impl From<PersonEntity> for MongoPersonDocument {
    fn from(value: PersonEntity) -> Self {
        Self {
            id: value.id,
            roster_id: value.roster_id,
            first_name: value.first_name,
            last_name: value.last_name,
            gender: value.gender,
            photo_url: value.photo_url,
        }
    }
}

impl From<MongoPersonDocument> for PersonEntity {
    fn from(value: MongoPersonDocument) -> Self {
        Self {
            id: value.id,
            roster_id: value.roster_id,
            first_name: value.first_name,
            last_name: value.last_name,
            gender: value.gender,
            photo_url: value.photo_url,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
