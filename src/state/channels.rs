//! Per-session broadcast channels for realtime fan-out.
//!
//! Every live session owns three channels: presence heartbeats, session
//! status flips and a row-change feed that tells dashboard streams to
//! recompute. Channels exist only while someone cares; the registry drops
//! them on completion and prunes entries nobody subscribes to anymore.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::sse::{PresenceUpdate, RowChangeEvent, SessionStatusEvent};

/// Buffered events per channel before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Name of the presence channel for a session, used in log fields.
pub fn presence_channel(session_id: Uuid) -> String {
    format!("presence:game:{session_id}")
}

/// Name of the status channel for a session, used in log fields.
pub fn status_channel(session_id: Uuid) -> String {
    format!("game:{session_id}")
}

/// Name of the row-change channel for a session, used in log fields.
pub fn rows_channel(session_id: Uuid) -> String {
    format!("rows:game:{session_id}")
}

/// The broadcast senders backing one session's realtime feeds.
pub struct SessionChannels {
    presence: broadcast::Sender<PresenceUpdate>,
    status: broadcast::Sender<SessionStatusEvent>,
    changes: broadcast::Sender<RowChangeEvent>,
}

impl SessionChannels {
    fn new() -> Self {
        let (presence, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (status, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            presence,
            status,
            changes,
        }
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceUpdate> {
        self.presence.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<RowChangeEvent> {
        self.changes.subscribe()
    }

    /// Send errors only mean nobody is listening, which is fine.
    pub fn publish_presence(&self, update: PresenceUpdate) {
        let _ = self.presence.send(update);
    }

    pub fn publish_status(&self, event: SessionStatusEvent) {
        let _ = self.status.send(event);
    }

    pub fn publish_change(&self, event: RowChangeEvent) {
        let _ = self.changes.send(event);
    }

    fn is_idle(&self) -> bool {
        self.presence.receiver_count() == 0
            && self.status.receiver_count() == 0
            && self.changes.receiver_count() == 0
    }
}

/// Registry of live session channels, keyed by session id.
#[derive(Default)]
pub struct ChannelRegistry {
    sessions: DashMap<Uuid, Arc<SessionChannels>>,
}

impl ChannelRegistry {
    /// Channels for a session, created on first use.
    pub fn channels(&self, session_id: Uuid) -> Arc<SessionChannels> {
        self.sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(SessionChannels::new()))
            .clone()
    }

    /// Channels for a session only if they already exist.
    pub fn get(&self, session_id: Uuid) -> Option<Arc<SessionChannels>> {
        self.sessions.get(&session_id).map(|entry| entry.clone())
    }

    /// Drop a session's channels unconditionally.
    ///
    /// Held receivers still drain whatever was already buffered before they
    /// observe the close.
    pub fn release(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }

    /// Drop a session's channels if nobody subscribes to any of them.
    pub fn prune(&self, session_id: Uuid) {
        self.sessions
            .remove_if(&session_id, |_, channels| channels.is_idle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::SessionStatus;
    use crate::dto::sse::RowChangeKind;

    #[test]
    fn channel_names_follow_the_session_scoped_convention() {
        let id = Uuid::nil();
        assert_eq!(
            presence_channel(id),
            "presence:game:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(status_channel(id), "game:00000000-0000-0000-0000-000000000000");
        assert_eq!(
            rows_channel(id),
            "rows:game:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn publish_reaches_existing_subscribers() {
        let registry = ChannelRegistry::default();
        let session_id = Uuid::new_v4();
        let channels = registry.channels(session_id);
        let mut receiver = channels.subscribe_changes();

        channels.publish_change(RowChangeEvent {
            session_id,
            kind: RowChangeKind::Answer,
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.session_id, session_id);
    }

    #[tokio::test]
    async fn prune_keeps_channels_with_live_subscribers() {
        let registry = ChannelRegistry::default();
        let session_id = Uuid::new_v4();
        let channels = registry.channels(session_id);
        let _receiver = channels.subscribe_status();
        drop(channels);

        registry.prune(session_id);
        assert!(registry.get(session_id).is_some());
    }

    #[tokio::test]
    async fn prune_removes_idle_channels() {
        let registry = ChannelRegistry::default();
        let session_id = Uuid::new_v4();
        let _ = registry.channels(session_id);

        registry.prune(session_id);
        assert!(registry.get(session_id).is_none());
    }

    #[tokio::test]
    async fn release_still_delivers_buffered_events() {
        let registry = ChannelRegistry::default();
        let session_id = Uuid::new_v4();
        let channels = registry.channels(session_id);
        let mut receiver = channels.subscribe_status();

        channels.publish_status(SessionStatusEvent {
            session_id,
            status: SessionStatus::Completed,
        });
        drop(channels);
        registry.release(session_id);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.status, SessionStatus::Completed);
        assert!(receiver.recv().await.is_err());
    }
}
