use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        session::{CreateSessionRequest, SessionSummary},
        validation::validate_game_code,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling the session lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/by-code/{code}", get(get_session_by_code))
        .route("/sessions/{id}/complete", post(complete_session))
}

/// Open a fresh session and mint its join code.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionSummary),
        (status = 400, description = "Invalid parameters or roster too small"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    payload.validate()?;
    let summary = session_service::create_session(&state, payload).await?;
    Ok(Json(summary))
}

/// Fetch a session by its identifier.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Session found", body = SessionSummary),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::session_summary(&state, id).await?;
    Ok(Json(summary))
}

/// Fetch the active session carrying a join code.
#[utoipa::path(
    get,
    path = "/sessions/by-code/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code shown to players")),
    responses(
        (status = 200, description = "Active session found", body = SessionSummary),
        (status = 400, description = "Malformed code"),
        (status = 404, description = "No active session with this code")
    )
)]
pub async fn get_session_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    if let Err(err) = validate_game_code(&code) {
        return Err(AppError::BadRequest(err.to_string()));
    }
    let summary = session_service::session_by_code(&state, &code).await?;
    Ok(Json(summary))
}

/// Force-terminate a session, pushing every connected player to a summary.
#[utoipa::path(
    post,
    path = "/sessions/{id}/complete",
    tag = "sessions",
    params(("id" = String, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Session completed", body = SessionSummary),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn complete_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::complete_session(&state, id).await?;
    Ok(Json(summary))
}
