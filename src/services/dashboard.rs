//! Host dashboard aggregation and its SSE stream.
//!
//! The dashboard never patches state incrementally: every change
//! notification triggers a full recompute from the stored rows. That trades
//! a little work per event for immunity to missed or reordered events.

use std::{
    collections::HashMap,
    convert::Infallible,
    time::{Duration, SystemTime},
};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{PlayRowEntity, SessionEntity, SessionStatus},
    dto::{
        dashboard::{DashboardSnapshot, PlayerProgress},
        format_system_time,
        sse::ServerEvent,
    },
    error::ServiceError,
    services::events::{EVENT_PRESENCE, EVENT_SNAPSHOT, EVENT_STATUS},
    state::SharedState,
};

/// Build the full dashboard snapshot from a session and its play rows.
///
/// Rows must be in creation order; player entries come out in join order and
/// duplicate display names get positional ordinals so the host can tell
/// same-named players apart.
pub fn compute_snapshot(session: &SessionEntity, rows: &[PlayRowEntity]) -> DashboardSnapshot {
    let sentinels: Vec<&PlayRowEntity> = rows.iter().filter(|row| row.is_join_sentinel()).collect();
    let answers: Vec<&PlayRowEntity> = rows.iter().filter(|row| !row.is_join_sentinel()).collect();

    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for sentinel in &sentinels {
        *name_counts.entry(sentinel.player_name.as_str()).or_insert(0) += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut players = Vec::with_capacity(sentinels.len());

    for sentinel in &sentinels {
        let ordinal = seen
            .entry(sentinel.player_name.as_str())
            .and_modify(|n| *n += 1)
            .or_insert(1);
        let display_name = if name_counts[sentinel.player_name.as_str()] > 1 {
            format!("{} ({ordinal})", sentinel.player_name)
        } else {
            sentinel.player_name.clone()
        };

        let correct = answers
            .iter()
            .filter(|row| row.join_token == sentinel.join_token && row.is_correct)
            .count() as u32;
        let answered_rows = answers
            .iter()
            .filter(|row| row.join_token == sentinel.join_token)
            .count() as u32;
        // Timed-out questions have an outcome row and therefore count as
        // wrong here, even though a reload would ask them again.
        let wrong = answered_rows - correct;
        let missing = session.total_questions.saturating_sub(answered_rows);

        players.push(PlayerProgress {
            join_id: sentinel.id,
            display_name,
            correct,
            wrong,
            missing,
            answered: answered_rows >= session.total_questions,
            active: sentinel.is_active,
        });
    }

    DashboardSnapshot {
        session_id: session.id,
        status: session.status,
        total_questions: session.total_questions,
        players,
        generated_at: format_system_time(SystemTime::now()),
    }
}

/// Recompute the snapshot for a session from the store.
pub async fn snapshot_for_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<DashboardSnapshot, ServiceError> {
    let store = state.require_session_store().await?;
    let session = store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id} not found")))?;
    let rows = store.rows_for_session(session_id).await?;
    Ok(compute_snapshot(&session, &rows))
}

/// Open the host SSE stream for a session.
///
/// Emits an immediate snapshot, then a fresh snapshot on every row change,
/// presence updates as they happen, and a status event plus final snapshot
/// when the session completes. Subscriptions are taken before the first
/// snapshot so no change can slip between them.
pub fn dashboard_stream(
    state: SharedState,
    session: SessionEntity,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = session.id;
    let channels = state.channels().channels(session_id);
    let mut changes_rx = channels.subscribe_changes();
    let mut presence_rx = channels.subscribe_presence();
    let mut status_rx = channels.subscribe_status();
    drop(channels);

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut open = push_snapshot(&state, session_id, &tx).await;

        // A session that is already over gets its one snapshot and nothing
        // further will ever be published.
        if session.status == SessionStatus::Completed {
            open = false;
        }

        while open {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = changes_rx.recv() => {
                    match recv_result {
                        Ok(_) => {
                            open = push_snapshot(&state, session_id, &tx).await;
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Missed notifications are harmless; the next
                            // recompute covers them all.
                            open = push_snapshot(&state, session_id, &tx).await;
                        }
                    }
                }
                recv_result = presence_rx.recv() => {
                    match recv_result {
                        Ok(update) => {
                            open = forward_json(&tx, EVENT_PRESENCE, &update).await;
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
                recv_result = status_rx.recv() => {
                    match recv_result {
                        Ok(event) => {
                            let completed = event.status == SessionStatus::Completed;
                            if forward_json(&tx, EVENT_STATUS, &event).await && completed {
                                let _ = push_snapshot(&state, session_id, &tx).await;
                            }
                            if completed {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        state.channels().prune(session_id);
        info!(session_id = %session_id, "dashboard stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Recompute and send one snapshot. Returns false once the client is gone.
async fn push_snapshot(
    state: &SharedState,
    session_id: Uuid,
    tx: &mpsc::Sender<Result<Event, Infallible>>,
) -> bool {
    match snapshot_for_session(state, session_id).await {
        Ok(snapshot) => forward_json(tx, EVENT_SNAPSHOT, &snapshot).await,
        Err(err) => {
            // Storage hiccups must not kill the stream; the next change
            // notification recomputes again.
            warn!(session_id = %session_id, error = %err, "failed to recompute dashboard snapshot");
            true
        }
    }
}

async fn forward_json<T: Serialize>(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    event_name: &str,
    payload: &T,
) -> bool {
    match ServerEvent::json(Some(event_name.to_string()), payload) {
        Ok(payload) => {
            let mut event = Event::default().data(payload.data);
            if let Some(name) = payload.event {
                event = event.event(name);
            }
            tx.send(Ok(event)).await.is_ok()
        }
        Err(err) => {
            warn!(event = event_name, error = %err, "failed to serialize SSE payload");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::QuestionKind;

    fn session(total_questions: u32) -> SessionEntity {
        SessionEntity::new(
            Uuid::new_v4(),
            "7XKQ2M".to_owned(),
            QuestionKind::PhotoToName,
            total_questions,
            20,
            4,
            None,
        )
    }

    fn join(session_id: Uuid, name: &str, token: &str) -> PlayRowEntity {
        PlayRowEntity::new_join(session_id, name.to_owned(), token.to_owned())
    }

    fn answer(session_id: Uuid, token: &str, correct: bool) -> PlayRowEntity {
        let target = Uuid::new_v4();
        let selected = if correct { Some(target) } else { Some(Uuid::new_v4()) };
        PlayRowEntity::new_answer(
            session_id,
            token.to_owned(),
            "whoever".to_owned(),
            target,
            selected,
            1000,
        )
    }

    fn timeout(session_id: Uuid, token: &str) -> PlayRowEntity {
        PlayRowEntity::new_answer(
            session_id,
            token.to_owned(),
            "whoever".to_owned(),
            Uuid::new_v4(),
            None,
            20_000,
        )
    }

    #[test]
    fn empty_sessions_produce_an_empty_player_list() {
        let session = session(5);
        let snapshot = compute_snapshot(&session, &[]);

        assert_eq!(snapshot.session_id, session.id);
        assert!(snapshot.players.is_empty());
        assert_eq!(snapshot.total_questions, 5);
    }

    #[test]
    fn tallies_split_into_correct_wrong_and_missing() {
        let session = session(5);
        let rows = vec![
            join(session.id, "Ada", "tok-a"),
            answer(session.id, "tok-a", true),
            answer(session.id, "tok-a", true),
            answer(session.id, "tok-a", false),
            timeout(session.id, "tok-a"),
        ];

        let snapshot = compute_snapshot(&session, &rows);

        assert_eq!(snapshot.players.len(), 1);
        let player = &snapshot.players[0];
        assert_eq!(player.correct, 2);
        assert_eq!(player.wrong, 2, "timeouts count as wrong on the dashboard");
        assert_eq!(player.missing, 1);
        assert!(!player.answered);
    }

    #[test]
    fn duplicate_names_get_creation_order_ordinals() {
        let session = session(3);
        let rows = vec![
            join(session.id, "Ada", "tok-1"),
            join(session.id, "Sam", "tok-2"),
            join(session.id, "Ada", "tok-3"),
        ];

        let snapshot = compute_snapshot(&session, &rows);

        let names: Vec<&str> = snapshot
            .players
            .iter()
            .map(|p| p.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ada (1)", "Sam", "Ada (2)"]);
    }

    #[test]
    fn answers_are_scoped_to_their_own_identity() {
        let session = session(2);
        let rows = vec![
            join(session.id, "Ada", "tok-a"),
            join(session.id, "Sam", "tok-b"),
            answer(session.id, "tok-a", true),
            answer(session.id, "tok-b", false),
        ];

        let snapshot = compute_snapshot(&session, &rows);

        assert_eq!(snapshot.players[0].correct, 1);
        assert_eq!(snapshot.players[0].wrong, 0);
        assert_eq!(snapshot.players[1].correct, 0);
        assert_eq!(snapshot.players[1].wrong, 1);
    }

    #[test]
    fn extra_rows_never_underflow_the_missing_count() {
        let session = session(2);
        let rows = vec![
            join(session.id, "Ada", "tok-a"),
            answer(session.id, "tok-a", true),
            answer(session.id, "tok-a", true),
            answer(session.id, "tok-a", false),
        ];

        let snapshot = compute_snapshot(&session, &rows);

        let player = &snapshot.players[0];
        assert_eq!(player.missing, 0);
        assert!(player.answered);
    }

    #[test]
    fn activity_flag_passes_through() {
        let session = session(2);
        let mut inactive = join(session.id, "Ada", "tok-a");
        inactive.is_active = false;
        let rows = vec![inactive, join(session.id, "Sam", "tok-b")];

        let snapshot = compute_snapshot(&session, &rows);

        assert!(!snapshot.players[0].active);
        assert!(snapshot.players[1].active);
    }
}
