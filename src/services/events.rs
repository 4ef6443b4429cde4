//! Publication helpers for the per-session realtime channels.
//!
//! Services that write play rows publish here right after the write lands,
//! so host dashboards learn about changes without polling. Events are typed
//! until the SSE edge, where the dashboard stream serialises them.

use std::time::SystemTime;

use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{PlayRowEntity, SessionStatus},
    dto::{
        format_system_time,
        sse::{PresenceStatus, PresenceUpdate, RowChangeEvent, RowChangeKind, SessionStatusEvent},
    },
    state::{
        SharedState,
        channels::{presence_channel, rows_channel, status_channel},
    },
};

/// SSE event name carrying a full dashboard snapshot.
pub const EVENT_SNAPSHOT: &str = "dashboard.snapshot";
/// SSE event name carrying a presence update.
pub const EVENT_PRESENCE: &str = "presence";
/// SSE event name carrying a session status flip.
pub const EVENT_STATUS: &str = "session.status";

/// Broadcast a presence heartbeat for one join identity.
pub fn broadcast_presence(
    state: &SharedState,
    session_id: Uuid,
    identity: &PlayRowEntity,
    status: PresenceStatus,
) {
    let update = PresenceUpdate {
        join_id: identity.id,
        player_name: identity.player_name.clone(),
        status,
        timestamp: format_system_time(SystemTime::now()),
    };
    debug!(
        channel = %presence_channel(session_id),
        player = %update.player_name,
        status = ?status,
        "broadcasting presence update"
    );
    state.channels().channels(session_id).publish_presence(update);
}

/// Broadcast that a session's play rows changed.
pub fn broadcast_row_change(state: &SharedState, session_id: Uuid, kind: RowChangeKind) {
    debug!(
        channel = %rows_channel(session_id),
        kind = ?kind,
        "broadcasting row change"
    );
    state
        .channels()
        .channels(session_id)
        .publish_change(RowChangeEvent { session_id, kind });
}

/// Broadcast a session lifecycle flip.
pub fn broadcast_session_status(state: &SharedState, session_id: Uuid, status: SessionStatus) {
    debug!(
        channel = %status_channel(session_id),
        status = ?status,
        "broadcasting session status"
    );
    state
        .channels()
        .channels(session_id)
        .publish_status(SessionStatusEvent { session_id, status });
}
