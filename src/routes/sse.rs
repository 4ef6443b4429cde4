use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{dashboard, session_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "dashboard",
    params(("id" = String, Path, description = "Identifier of the session to observe")),
    responses(
        (status = 200, description = "Dashboard SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
/// Stream realtime dashboard events for one session to its host.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    // Resolve the session before committing to a stream so an unknown id
    // still gets a plain 404 instead of an empty event stream.
    let session = session_service::load_session(&state, id).await?;
    info!(session_id = %id, "new dashboard SSE connection");
    Ok(dashboard::dashboard_stream(state, session))
}

/// Configure the SSE endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/events", get(session_events))
}
