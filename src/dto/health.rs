use serde::Serialize;
use utoipa::ToSchema;

/// Health states the `/healthcheck` route can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// A storage backend is installed and serving.
    Ok,
    /// No storage backend is installed; store-backed routes answer 503.
    Degraded,
}

/// Body of the `/healthcheck` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

impl HealthResponse {
    /// Report a healthy service.
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
        }
    }

    /// Report that storage is unavailable.
    pub fn degraded() -> Self {
        Self {
            status: HealthStatus::Degraded,
        }
    }
}
