use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::SessionStatus;

#[derive(Clone, Debug)]
/// Dispatched payload carried across the host SSE stream.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Where a player currently stands in their quiz run.
pub enum PresenceStatus {
    /// Connected and working through questions.
    Answering,
    /// Finished the quiz, connection may still be open.
    Finished,
    /// Connection closed before the quiz ended.
    Offline,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Broadcast on the presence channel when a player joins, finishes or drops.
pub struct PresenceUpdate {
    pub join_id: Uuid,
    pub player_name: String,
    pub status: PresenceStatus,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Broadcast on the status channel when the session lifecycle flips.
pub struct SessionStatusEvent {
    pub session_id: Uuid,
    pub status: SessionStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Which kind of write touched a session's play rows.
pub enum RowChangeKind {
    Join,
    Answer,
    Activity,
}

#[derive(Clone, Debug)]
/// In-process notification that a session's rows changed.
///
/// Never serialized to clients; dashboard streams recompute a snapshot when
/// they see one.
pub struct RowChangeEvent {
    pub session_id: Uuid,
    pub kind: RowChangeKind,
}
