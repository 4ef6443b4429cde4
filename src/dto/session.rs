//! Session creation and lookup payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{QuestionKind, SessionEntity, SessionStatus},
    dto::format_system_time,
};

/// Payload used to open a brand-new game session.
///
/// Quiz parameters are optional; whatever is omitted falls back to the
/// configured defaults.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Roster the questions are drawn from.
    pub roster_id: Uuid,
    /// Direction the matching runs in.
    pub question_kind: QuestionKind,
    #[serde(default)]
    #[validate(range(min = 1, max = 100))]
    pub total_questions: Option<u32>,
    #[serde(default)]
    #[validate(range(min = 5, max = 600))]
    pub time_limit_seconds: Option<u32>,
    #[serde(default)]
    #[validate(range(min = 2, max = 26))]
    pub options_count: Option<u32>,
    /// Opaque identity token of the host opening the session.
    #[serde(default)]
    #[validate(length(max = 200))]
    pub host_token: Option<String>,
}

/// Session details returned to hosts and join pages.
///
/// The host token never leaves the backend.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub roster_id: Uuid,
    /// Shareable six-character join code.
    pub code: String,
    pub question_kind: QuestionKind,
    pub status: SessionStatus,
    pub total_questions: u32,
    pub time_limit_seconds: u32,
    pub options_count: u32,
    /// Most recently finished score, if any round ended already.
    pub last_score: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SessionEntity> for SessionSummary {
    fn from(session: SessionEntity) -> Self {
        Self {
            id: session.id,
            roster_id: session.roster_id,
            code: session.code,
            question_kind: session.question_kind,
            status: session.status,
            total_questions: session.total_questions,
            time_limit_seconds: session.time_limit_seconds,
            options_count: session.options_count,
            last_score: session.last_score,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_never_exposes_the_host_token() {
        let session = SessionEntity::new(
            Uuid::nil(),
            "7XKQ2M".to_owned(),
            QuestionKind::PhotoToName,
            5,
            20,
            4,
            Some("host-secret".to_owned()),
        );

        let summary = SessionSummary::from(session);
        let json = serde_json::to_string(&summary).unwrap();

        assert!(!json.contains("host-secret"));
        assert!(json.contains("\"code\""));
    }

    #[test]
    fn create_request_rejects_out_of_range_parameters() {
        let request: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "roster_id": Uuid::nil(),
            "question_kind": "photo_to_name",
            "total_questions": 0,
        }))
        .unwrap();

        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_accepts_minimal_payload() {
        let request: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "roster_id": Uuid::nil(),
            "question_kind": "name_to_photo",
        }))
        .unwrap();

        assert!(request.validate().is_ok());
        assert!(request.total_questions.is_none());
    }
}
