//! Per-connection engine for the player WebSocket.
//!
//! Each connection runs one quiz at a time: join, question loop, summary,
//! then either a restart under a fresh token or teardown. Every await point
//! also listens for a session status flip so a host ending the round forces
//! the player straight to their summary.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitStream};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::interval,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PlayRowEntity, SessionEntity, SessionStatus},
        session_store::SessionStore,
    },
    dto::{
        play::{PlayerInboundMessage, PlayerOutboundMessage},
        sse::{PresenceStatus, RowChangeKind, SessionStatusEvent},
    },
    services::{
        answer_service::{self, AnswerRecord},
        events,
        join_service::{self, JoinRequest},
        quiz::{Question, QuizSettings, generate_quiz, project_question},
    },
    state::{
        SharedState,
        resume::{ResumeKey, TimerResume},
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Internal error type for socket write operations.
#[derive(Debug, Error)]
enum PlayWriteError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
}

/// The join parameters a run starts from.
#[derive(Debug, Clone)]
struct JoinAttempt {
    code: String,
    player_name: String,
    join_token: String,
    retry: bool,
}

/// Identity a run resolved to, needed for teardown bookkeeping.
struct ActiveIdentity {
    session_id: Uuid,
    identity: PlayRowEntity,
}

/// How one quiz run ended.
enum RunOutcome {
    /// Player wants another run under the given fresh token.
    Restart { join_token: String },
    /// Quiz finished and the player closed the connection.
    Finished,
    /// The host force-ended the session.
    Terminated,
    /// The client went away.
    Disconnected,
    /// The join or a write could not be honored.
    Rejected,
}

/// Outcome of a single asked question.
enum QuestionOutcome {
    Answered {
        selected: Option<Uuid>,
        response_time_ms: u64,
    },
    Restart {
        join_token: String,
    },
    Terminated,
    Disconnected,
}

enum IdleOutcome {
    Restart { join_token: String },
    Closed,
}

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let mut attempt = match PlayerInboundMessage::from_json_str(&initial_message) {
        Ok(PlayerInboundMessage::Join {
            code,
            player_name,
            join_token,
            retry,
        }) => JoinAttempt {
            code,
            player_name,
            join_token,
            retry,
        },
        Ok(_) => {
            warn!("first frame was not a join");
            let _ = send_rejection(&outbound_tx, "expected a join message first");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate join message");
            let _ = send_rejection(&outbound_tx, "invalid join message");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    loop {
        let (outcome, active) = run_quiz(&state, &mut receiver, &outbound_tx, &attempt).await;

        let restarting = matches!(outcome, RunOutcome::Restart { .. });
        if let Some(active) = active {
            teardown_identity(&state, &active, restarting).await;
        }

        match outcome {
            RunOutcome::Restart { join_token } => {
                attempt.join_token = join_token;
                attempt.retry = true;
            }
            RunOutcome::Finished
            | RunOutcome::Terminated
            | RunOutcome::Disconnected
            | RunOutcome::Rejected => break,
        }
    }

    let _ = outbound_tx.send(Message::Close(None));
    finalize(writer_task, outbound_tx).await;
}

/// Run one quiz attempt from join resolution to its end.
async fn run_quiz(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    attempt: &JoinAttempt,
) -> (RunOutcome, Option<ActiveIdentity>) {
    let store = match state.require_session_store().await {
        Ok(store) => store,
        Err(_) => {
            let _ = send_rejection(outbound_tx, "storage unavailable, try again shortly");
            return (RunOutcome::Rejected, None);
        }
    };

    let session = match store.find_session_by_code(attempt.code.clone()).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            let _ = send_rejection(outbound_tx, "unknown or already finished game code");
            return (RunOutcome::Rejected, None);
        }
        Err(err) => {
            warn!(code = %attempt.code, error = %err, "failed to look up session by code");
            let _ = send_rejection(outbound_tx, "storage unavailable, try again shortly");
            return (RunOutcome::Rejected, None);
        }
    };

    let resolved = match join_service::resolve_join(
        &store,
        JoinRequest {
            session_id: session.id,
            player_name: attempt.player_name.clone(),
            join_token: attempt.join_token.clone(),
            retry: attempt.retry,
        },
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to resolve join");
            let _ = send_rejection(outbound_tx, "could not join, try again shortly");
            return (RunOutcome::Rejected, None);
        }
    };
    let identity = resolved.identity;
    let active = ActiveIdentity {
        session_id: session.id,
        identity: identity.clone(),
    };

    // A restart must not inherit any running clock, neither from the token
    // the client supplied nor from the identity it actually got.
    if attempt.retry {
        state.checkpoints().clear(&ResumeKey {
            session_id: session.id,
            join_token: attempt.join_token.clone(),
        });
        state.checkpoints().clear(&ResumeKey {
            session_id: session.id,
            join_token: identity.join_token.clone(),
        });
    }

    let people = match store.find_people(session.roster_id).await {
        Ok(people) => people,
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to load roster");
            let _ = send_rejection(outbound_tx, "storage unavailable, try again shortly");
            return (RunOutcome::Rejected, Some(active));
        }
    };

    let settings = QuizSettings {
        total_questions: session.total_questions as usize,
        options_count: (session.options_count as usize).min(people.len()),
    };
    let quiz = {
        let mut rng = rand::rng();
        generate_quiz(&people, settings, &mut rng)
    };
    let quiz = match quiz {
        Ok(quiz) => quiz,
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "cannot generate a quiz");
            let _ = send_rejection(outbound_tx, &err.to_string());
            return (RunOutcome::Rejected, Some(active));
        }
    };

    let mut status_rx = state.channels().channels(session.id).subscribe_status();

    // The channel only carries flips that happen after this point; a
    // completion since the code lookup is caught by re-reading the session.
    match store.find_session(session.id).await {
        Ok(Some(current)) if current.status == SessionStatus::Active => {}
        Ok(_) => {
            let outcome = send_terminated_summary(&store, outbound_tx, &session, &identity).await;
            return (outcome, Some(active));
        }
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to re-check session status");
            let _ = send_rejection(outbound_tx, "storage unavailable, try again shortly");
            return (RunOutcome::Rejected, Some(active));
        }
    }

    if send_message(
        outbound_tx,
        &PlayerOutboundMessage::Joined {
            join_id: identity.id,
            session_id: session.id,
            player_name: identity.player_name.clone(),
            join_token: identity.join_token.clone(),
            resume_index: resolved.resume_index,
            total_questions: session.total_questions,
        },
    )
    .is_err()
    {
        return (RunOutcome::Disconnected, Some(active));
    }

    events::broadcast_presence(state, session.id, &identity, PresenceStatus::Answering);
    events::broadcast_row_change(state, session.id, RowChangeKind::Join);
    info!(
        session_id = %session.id,
        player = %identity.player_name,
        path = ?resolved.path,
        resume_index = resolved.resume_index,
        "player joined"
    );

    for (index, question) in quiz.iter().enumerate().skip(resolved.resume_index) {
        let outcome = ask_question(
            state,
            receiver,
            outbound_tx,
            &mut status_rx,
            &session,
            &identity,
            index,
            question,
        )
        .await;

        match outcome {
            QuestionOutcome::Answered {
                selected,
                response_time_ms,
            } => {
                let record = AnswerRecord {
                    session_id: session.id,
                    join_token: identity.join_token.clone(),
                    player_name: identity.player_name.clone(),
                    question_index: index,
                    correct_person_id: question.correct.id,
                    selected_person_id: selected,
                    response_time_ms,
                };
                let row = match answer_service::record_answer(&store, record).await {
                    Ok(row) => row,
                    Err(err) => {
                        warn!(session_id = %session.id, error = %err, "failed to record answer");
                        let _ = send_rejection(outbound_tx, "storage unavailable, rejoin to continue");
                        return (RunOutcome::Rejected, Some(active));
                    }
                };
                state.checkpoints().clear(&ResumeKey {
                    session_id: session.id,
                    join_token: identity.join_token.clone(),
                });
                events::broadcast_row_change(state, session.id, RowChangeKind::Answer);

                if send_message(
                    outbound_tx,
                    &PlayerOutboundMessage::AnswerResult {
                        index,
                        correct: row.is_correct,
                        correct_person_id: question.correct.id,
                    },
                )
                .is_err()
                {
                    return (RunOutcome::Disconnected, Some(active));
                }
            }
            QuestionOutcome::Restart { join_token } => {
                return (RunOutcome::Restart { join_token }, Some(active));
            }
            QuestionOutcome::Terminated => {
                let outcome = send_terminated_summary(&store, outbound_tx, &session, &identity).await;
                return (outcome, Some(active));
            }
            QuestionOutcome::Disconnected => {
                return (RunOutcome::Disconnected, Some(active));
            }
        }
    }

    let score = match answer_service::finalize_score(&store, session.id, &identity.join_token).await
    {
        Ok(score) => score,
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to finalize score");
            let _ = send_rejection(outbound_tx, "storage unavailable, rejoin for your score");
            return (RunOutcome::Rejected, Some(active));
        }
    };

    if send_message(
        outbound_tx,
        &PlayerOutboundMessage::Summary {
            score,
            total: session.total_questions,
            terminated: false,
        },
    )
    .is_err()
    {
        return (RunOutcome::Disconnected, Some(active));
    }
    events::broadcast_presence(state, session.id, &identity, PresenceStatus::Finished);
    info!(
        session_id = %session.id,
        player = %identity.player_name,
        score,
        "player finished the quiz"
    );

    match idle_until_restart(receiver, outbound_tx, &mut status_rx, &identity).await {
        IdleOutcome::Restart { join_token } => (RunOutcome::Restart { join_token }, Some(active)),
        IdleOutcome::Closed => (RunOutcome::Finished, Some(active)),
    }
}

/// Ask one question and wait for its resolution.
///
/// The countdown lives here as a one-second interval; it dies with the
/// connection, so a disconnected player never auto-answers.
#[allow(clippy::too_many_arguments)]
async fn ask_question(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    status_rx: &mut broadcast::Receiver<SessionStatusEvent>,
    session: &SessionEntity,
    identity: &PlayRowEntity,
    index: usize,
    question: &Question,
) -> QuestionOutcome {
    let key = ResumeKey {
        session_id: session.id,
        join_token: identity.join_token.clone(),
    };
    let limit = Duration::from_secs(u64::from(session.time_limit_seconds));

    let (remaining, base_elapsed) = match state.checkpoints().resume(&key, index, limit) {
        TimerResume::Fresh => {
            state.checkpoints().mark(key.clone(), index);
            (limit, Duration::ZERO)
        }
        TimerResume::Resumed { remaining } => (remaining, limit - remaining),
    };

    if send_message(
        outbound_tx,
        &PlayerOutboundMessage::Question {
            index,
            total: session.total_questions,
            remaining_seconds: remaining.as_secs(),
            question: project_question(session.question_kind, question),
        },
    )
    .is_err()
    {
        return QuestionOutcome::Disconnected;
    }

    let asked_at = Instant::now();
    let deadline = asked_at + remaining;
    let mut ticker = interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if Instant::now() >= deadline {
                    // The countdown expired; record it as an unanswered
                    // outcome at the full limit.
                    return QuestionOutcome::Answered {
                        selected: None,
                        response_time_ms: limit.as_millis() as u64,
                    };
                }
            }
            recv_result = status_rx.recv() => {
                match recv_result {
                    Ok(event) if event.status == SessionStatus::Completed => {
                        return QuestionOutcome::Terminated;
                    }
                    Ok(_) => continue,
                    // The channel closes when the session's resources are
                    // torn down, which only happens on completion.
                    Err(broadcast::error::RecvError::Closed) => {
                        return QuestionOutcome::Terminated;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match PlayerInboundMessage::from_json_str(&text) {
                            Ok(PlayerInboundMessage::Answer { selected_person_id }) => {
                                let response_time = base_elapsed + asked_at.elapsed();
                                return QuestionOutcome::Answered {
                                    selected: selected_person_id,
                                    response_time_ms: response_time.as_millis() as u64,
                                };
                            }
                            Ok(PlayerInboundMessage::Restart { join_token }) => {
                                return QuestionOutcome::Restart { join_token };
                            }
                            Ok(PlayerInboundMessage::Join { .. }) => {
                                warn!(
                                    player = %identity.player_name,
                                    "ignoring join frame in the middle of a run"
                                );
                            }
                            Ok(PlayerInboundMessage::Unknown) => {
                                warn!(player = %identity.player_name, "ignoring unknown frame");
                            }
                            Err(err) => {
                                warn!(
                                    player = %identity.player_name,
                                    error = %err,
                                    "failed to parse or validate player message"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(_))) => return QuestionOutcome::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket error");
                        return QuestionOutcome::Disconnected;
                    }
                    None => return QuestionOutcome::Disconnected,
                }
            }
        }
    }
}

/// Force the player to a summary after the host ended the session.
async fn send_terminated_summary(
    store: &Arc<dyn SessionStore>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    session: &SessionEntity,
    identity: &PlayRowEntity,
) -> RunOutcome {
    let score =
        match answer_service::authoritative_score(store, session.id, &identity.join_token).await {
            Ok(score) => score,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "failed to count score after termination");
                let _ = send_rejection(outbound_tx, "session ended, storage unavailable");
                return RunOutcome::Rejected;
            }
        };

    let _ = send_message(
        outbound_tx,
        &PlayerOutboundMessage::Summary {
            score,
            total: session.total_questions,
            terminated: true,
        },
    );
    info!(
        session_id = %session.id,
        player = %identity.player_name,
        score,
        "player forced to summary by session completion"
    );
    RunOutcome::Terminated
}

/// After a finished quiz, hold the connection for a possible restart.
async fn idle_until_restart(
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    status_rx: &mut broadcast::Receiver<SessionStatusEvent>,
    identity: &PlayRowEntity,
) -> IdleOutcome {
    loop {
        tokio::select! {
            recv_result = status_rx.recv() => {
                match recv_result {
                    Ok(event) if event.status == SessionStatus::Completed => {
                        return IdleOutcome::Closed;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Closed) => return IdleOutcome::Closed,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match PlayerInboundMessage::from_json_str(&text) {
                            Ok(PlayerInboundMessage::Restart { join_token }) => {
                                return IdleOutcome::Restart { join_token };
                            }
                            Ok(_) => {
                                warn!(
                                    player = %identity.player_name,
                                    "ignoring frame while waiting for a restart"
                                );
                            }
                            Err(err) => {
                                warn!(
                                    player = %identity.player_name,
                                    error = %err,
                                    "failed to parse or validate player message"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(_))) => return IdleOutcome::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket error");
                        return IdleOutcome::Closed;
                    }
                    None => return IdleOutcome::Closed,
                }
            }
        }
    }
}

/// Run the teardown bookkeeping for a resolved identity.
///
/// Both halves run on every teardown: a leave event on the presence channel
/// and the best-effort durable activity flip. A failed flip is logged and
/// swallowed; the dashboard will simply keep showing the player as active.
async fn teardown_identity(state: &SharedState, active: &ActiveIdentity, restarting: bool) {
    events::broadcast_presence(
        state,
        active.session_id,
        &active.identity,
        PresenceStatus::Offline,
    );

    match state.session_store().await {
        Some(store) => {
            match store
                .set_join_activity(
                    active.session_id,
                    active.identity.join_token.clone(),
                    false,
                )
                .await
            {
                Ok(_) => {
                    events::broadcast_row_change(state, active.session_id, RowChangeKind::Activity);
                }
                Err(err) => {
                    warn!(
                        session_id = %active.session_id,
                        error = %err,
                        "failed to flip join activity off"
                    );
                }
            }
        }
        None => {
            warn!(
                session_id = %active.session_id,
                "storage degraded, join stays marked active"
            );
        }
    }

    if restarting {
        info!(
            session_id = %active.session_id,
            player = %active.identity.player_name,
            "player restarting under a fresh identity"
        );
    } else {
        state.channels().prune(active.session_id);
        info!(
            session_id = %active.session_id,
            player = %active.identity.player_name,
            "player disconnected"
        );
    }
}

fn send_rejection(
    tx: &mpsc::UnboundedSender<Message>,
    message: &str,
) -> Result<(), PlayWriteError> {
    send_message(
        tx,
        &PlayerOutboundMessage::Rejected {
            message: message.to_owned(),
        },
    )
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are permanent errors, logged and swallowed; a
/// closed writer channel is returned so callers stop the run.
fn send_message<T>(tx: &mpsc::UnboundedSender<Message>, value: &T) -> Result<(), PlayWriteError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| PlayWriteError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
