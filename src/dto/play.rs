//! Messages exchanged over the player WebSocket.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::{validate_game_code, validate_join_token, validate_player_name};

/// Messages accepted from player WebSocket clients.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum PlayerInboundMessage {
    /// First frame on every connection; also sent again to adopt a new
    /// identity after a restart.
    #[serde(rename = "join")]
    Join {
        code: String,
        player_name: String,
        join_token: String,
        /// Set when the client believes it is re-joining after a drop.
        #[serde(default)]
        retry: bool,
    },
    /// Answer to the question currently on screen. Absent selection means the
    /// player gave up without picking.
    #[serde(rename = "answer")]
    Answer {
        #[serde(default)]
        selected_person_id: Option<Uuid>,
    },
    /// Throw away the current run and start over under a fresh token.
    #[serde(rename = "restart")]
    Restart { join_token: String },
    #[serde(other)]
    Unknown,
}

impl Validate for PlayerInboundMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self {
            Self::Join {
                code,
                player_name,
                join_token,
                ..
            } => {
                if let Err(e) = validate_game_code(code) {
                    errors.add("code", e);
                }
                if let Err(e) = validate_player_name(player_name) {
                    errors.add("player_name", e);
                }
                if let Err(e) = validate_join_token(join_token) {
                    errors.add("join_token", e);
                }
            }
            Self::Restart { join_token } => {
                if let Err(e) = validate_join_token(join_token) {
                    errors.add("join_token", e);
                }
            }
            Self::Answer { .. } | Self::Unknown => {}
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Why an inbound frame could not be used.
#[derive(Debug, Error)]
pub enum PlayMessageError {
    #[error("malformed play message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid play message: {0}")]
    Validation(#[from] ValidationErrors),
}

impl PlayerInboundMessage {
    /// Parse and validate one text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, PlayMessageError> {
        let message: Self = serde_json::from_str(raw)?;
        message.validate()?;
        Ok(message)
    }
}

/// Messages pushed to player WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum PlayerOutboundMessage {
    /// Join accepted; tells the client which identity it plays under and
    /// where in the quiz it resumes.
    #[serde(rename = "joined")]
    Joined {
        join_id: Uuid,
        session_id: Uuid,
        player_name: String,
        join_token: String,
        /// Zero-based index of the first question the client will be asked.
        resume_index: usize,
        total_questions: u32,
    },
    /// A question to put on screen.
    #[serde(rename = "question")]
    Question {
        index: usize,
        total: u32,
        /// Seconds left on the clock, already shortened on resumed timers.
        remaining_seconds: u64,
        question: QuestionView,
    },
    /// Outcome of the answer just given, revealing the correct person.
    #[serde(rename = "answer_result")]
    AnswerResult {
        index: usize,
        correct: bool,
        correct_person_id: Uuid,
    },
    /// Quiz over; final authoritative score.
    #[serde(rename = "summary")]
    Summary {
        score: u32,
        total: u32,
        /// True when the host force-ended the session mid-quiz.
        terminated: bool,
    },
    /// Join or frame refused; the connection closes right after.
    #[serde(rename = "rejected")]
    Rejected { message: String },
}

/// One question as shown to a player.
///
/// Only ever carries what the player may see: the prompt side of the pairing
/// plus the option side, never both for the same person.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    pub prompt: QuestionPrompt,
    pub options: Vec<QuestionOption>,
}

/// The side of the pairing shown as the question.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionPrompt {
    Name { text: String },
    Photo { photo_url: String },
}

/// One selectable option.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionOption {
    pub person_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_parses_and_validates() {
        let message = PlayerInboundMessage::from_json_str(
            r#"{"type":"join","code":"7XKQ2M","player_name":"Ada","join_token":"tok-1"}"#,
        )
        .unwrap();

        match message {
            PlayerInboundMessage::Join { retry, .. } => assert!(!retry),
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn join_frame_with_bad_code_is_rejected() {
        let result = PlayerInboundMessage::from_json_str(
            r#"{"type":"join","code":"oops","player_name":"Ada","join_token":"tok-1"}"#,
        );

        assert!(matches!(result, Err(PlayMessageError::Validation(_))));
    }

    #[test]
    fn answer_frame_tolerates_missing_selection() {
        let message = PlayerInboundMessage::from_json_str(r#"{"type":"answer"}"#).unwrap();

        match message {
            PlayerInboundMessage::Answer { selected_person_id } => {
                assert!(selected_person_id.is_none());
            }
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_types_fall_through_to_unknown() {
        let message = PlayerInboundMessage::from_json_str(r#"{"type":"buzz"}"#).unwrap();
        assert!(matches!(message, PlayerInboundMessage::Unknown));
    }

    #[test]
    fn question_options_omit_the_hidden_side() {
        let view = QuestionView {
            prompt: QuestionPrompt::Name {
                text: "Grace Hopper".to_owned(),
            },
            options: vec![QuestionOption {
                person_id: Uuid::nil(),
                photo_url: Some("/assets/demo/grace-hopper.jpg".to_owned()),
                display_name: None,
            }],
        };

        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("photo_url"));
        assert!(!json.contains("display_name"));
    }
}
