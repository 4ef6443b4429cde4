/// Answer recording and score recounting.
pub mod answer_service;
/// Host dashboard snapshots and their SSE stream.
pub mod dashboard;
/// OpenAPI documentation generation.
pub mod documentation;
/// In-process event broadcasting between player sockets and dashboards.
pub mod events;
/// Health check service.
pub mod health_service;
/// Join identity resolution, resume and retry handling.
pub mod join_service;
/// Per-connection engine for the player WebSocket.
pub mod player_socket;
/// Quiz generation from a roster of people.
pub mod quiz;
/// Session lifecycle operations.
pub mod session_service;
/// Storage connection supervisor and degraded-mode switching.
pub mod storage_supervisor;
