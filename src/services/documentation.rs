use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Mugmatch Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::get_session,
        crate::routes::session::get_session_by_code,
        crate::routes::session::complete_session,
        crate::routes::sse::session_events,
        crate::routes::websocket::play_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SessionSummary,
            crate::dto::dashboard::DashboardSnapshot,
            crate::dto::dashboard::PlayerProgress,
            crate::dto::sse::PresenceUpdate,
            crate::dto::sse::PresenceStatus,
            crate::dto::play::PlayerInboundMessage,
            crate::dto::play::PlayerOutboundMessage,
            crate::dto::play::QuestionView,
            crate::dto::play::QuestionPrompt,
            crate::dto::play::QuestionOption,
            crate::dao::models::QuestionKind,
            crate::dao::models::SessionStatus,
            crate::dao::models::Gender,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle operations"),
        (name = "dashboard", description = "Server-sent events dashboard stream"),
        (name = "play", description = "WebSocket operations for player clients"),
    )
)]
pub struct ApiDoc;
