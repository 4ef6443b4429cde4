//! Session lifecycle operations for hosts.

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{SessionEntity, SessionStatus},
        session_store::SessionStore,
    },
    dto::{
        session::{CreateSessionRequest, SessionSummary},
        validation::{GAME_CODE_ALPHABET, GAME_CODE_LENGTH},
    },
    error::ServiceError,
    services::{events, quiz::MIN_ROSTER_SIZE},
    state::SharedState,
};

/// How often code minting retries before giving up.
const MAX_CODE_ATTEMPTS: u32 = 5;

/// Draw one game code from the code alphabet.
fn mint_code_with(rng: &mut impl Rng) -> String {
    let alphabet: Vec<char> = GAME_CODE_ALPHABET.chars().collect();
    (0..GAME_CODE_LENGTH)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect()
}

/// Mint a code no *active* session currently uses.
///
/// Completed sessions do not reserve their code, so codes recycle naturally.
async fn mint_unique_code(store: &Arc<dyn SessionStore>) -> Result<String, ServiceError> {
    for attempt in 0..MAX_CODE_ATTEMPTS {
        let code = {
            let mut rng = rand::rng();
            mint_code_with(&mut rng)
        };
        if store.find_session_by_code(code.clone()).await?.is_none() {
            return Ok(code);
        }
        warn!(attempt, code, "minted game code collides with an active session");
    }
    Err(ServiceError::InvalidState(
        "could not allocate a unique game code".to_owned(),
    ))
}

/// Open a new session for the given roster.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_session_store().await?;

    let people = store.find_people(request.roster_id).await?;
    if people.len() < MIN_ROSTER_SIZE {
        return Err(ServiceError::InvalidInput(format!(
            "roster {} holds {} people but at least {MIN_ROSTER_SIZE} are required",
            request.roster_id,
            people.len()
        )));
    }

    let defaults = state.config().quiz();
    let total_questions = request.total_questions.unwrap_or(defaults.total_questions);
    let time_limit_seconds = request
        .time_limit_seconds
        .unwrap_or(defaults.time_limit_seconds);
    let options_count = request.options_count.unwrap_or(defaults.options_count);

    let code = mint_unique_code(&store).await?;
    let session = SessionEntity::new(
        request.roster_id,
        code,
        request.question_kind,
        total_questions,
        time_limit_seconds,
        options_count,
        request.host_token,
    );
    store.insert_session(session.clone()).await?;

    info!(session_id = %session.id, code = %session.code, "session created");
    Ok(session.into())
}

/// Load a session or fail with not-found.
pub async fn load_session(state: &SharedState, id: Uuid) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    store
        .find_session(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {id} not found")))
}

/// Session details by id.
pub async fn session_summary(state: &SharedState, id: Uuid) -> Result<SessionSummary, ServiceError> {
    Ok(load_session(state, id).await?.into())
}

/// Active session details by join code.
///
/// Completed sessions are invisible here; their codes may already belong to
/// someone else's new round.
pub async fn session_by_code(
    state: &SharedState,
    code: &str,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_session_store().await?;
    store
        .find_session_by_code(code.to_owned())
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::NotFound(format!("no active session with code {code}")))
}

/// Force-terminate a session.
///
/// Idempotent: only the flip from active to completed broadcasts the status
/// change and tears down the session's realtime resources.
pub async fn complete_session(
    state: &SharedState,
    id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_session_store().await?;

    let before = store
        .complete_session(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {id} not found")))?;

    if before.status == SessionStatus::Active {
        events::broadcast_session_status(state, id, SessionStatus::Completed);
        state.channels().release(id);
        state.checkpoints().sweep_session(id);
        info!(session_id = %id, "session completed by host");
    }

    let mut completed = before;
    completed.status = SessionStatus::Completed;
    Ok(completed.into())
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{Gender, PersonEntity, QuestionKind},
            session_store::memory::MemorySessionStore,
        },
        state::AppState,
    };

    fn roster(roster_id: Uuid, size: usize) -> Vec<PersonEntity> {
        (0..size)
            .map(|i| PersonEntity {
                id: Uuid::new_v4(),
                roster_id,
                first_name: format!("Person{i}"),
                last_name: "Example".to_owned(),
                gender: if i % 2 == 0 { Gender::Female } else { Gender::Male },
                photo_url: format!("/assets/p{i}.jpg"),
            })
            .collect()
    }

    async fn state_with_roster(roster_id: Uuid, size: usize) -> SharedState {
        let state = AppState::new(AppConfig::default());
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        store.seed_people(roster(roster_id, size)).await.unwrap();
        state.install_session_store(store).await;
        state
    }

    fn request(roster_id: Uuid) -> CreateSessionRequest {
        CreateSessionRequest {
            roster_id,
            question_kind: QuestionKind::PhotoToName,
            total_questions: None,
            time_limit_seconds: Some(30),
            options_count: None,
            host_token: None,
        }
    }

    #[test]
    fn minted_codes_are_deterministic_and_well_formed() {
        let mut first_rng = StdRng::seed_from_u64(11);
        let mut second_rng = StdRng::seed_from_u64(11);

        let first = mint_code_with(&mut first_rng);
        let second = mint_code_with(&mut second_rng);

        assert_eq!(first, second);
        assert_eq!(first.chars().count(), GAME_CODE_LENGTH);
        assert!(first.chars().all(|c| GAME_CODE_ALPHABET.contains(c)));
    }

    #[tokio::test]
    async fn create_session_applies_configured_defaults() {
        let roster_id = Uuid::new_v4();
        let state = state_with_roster(roster_id, 4).await;

        let summary = create_session(&state, request(roster_id)).await.unwrap();

        assert_eq!(summary.total_questions, 5);
        assert_eq!(summary.time_limit_seconds, 30);
        assert_eq!(summary.options_count, 4);
        assert_eq!(summary.status, SessionStatus::Active);
        assert_eq!(summary.code.chars().count(), GAME_CODE_LENGTH);
    }

    #[tokio::test]
    async fn create_session_rejects_a_tiny_roster() {
        let roster_id = Uuid::new_v4();
        let state = state_with_roster(roster_id, 1).await;

        let result = create_session(&state, request(roster_id)).await;

        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn completed_sessions_disappear_from_code_lookup() {
        let roster_id = Uuid::new_v4();
        let state = state_with_roster(roster_id, 4).await;
        let summary = create_session(&state, request(roster_id)).await.unwrap();

        assert!(session_by_code(&state, &summary.code).await.is_ok());

        complete_session(&state, summary.id).await.unwrap();

        let lookup = session_by_code(&state, &summary.code).await;
        assert!(matches!(lookup, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn complete_session_broadcasts_exactly_once() {
        let roster_id = Uuid::new_v4();
        let state = state_with_roster(roster_id, 4).await;
        let summary = create_session(&state, request(roster_id)).await.unwrap();

        let mut status_rx = state.channels().channels(summary.id).subscribe_status();

        let first = complete_session(&state, summary.id).await.unwrap();
        assert_eq!(first.status, SessionStatus::Completed);

        let second = complete_session(&state, summary.id).await.unwrap();
        assert_eq!(second.status, SessionStatus::Completed);

        let event = status_rx.recv().await.unwrap();
        assert_eq!(event.status, SessionStatus::Completed);
        assert!(
            status_rx.try_recv().is_err(),
            "a repeated completion does not broadcast again"
        );
    }
}
