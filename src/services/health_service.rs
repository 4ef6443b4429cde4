use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Current health of the service, pinging the storage backend when present.
///
/// A failing ping is logged but does not flip the report to degraded; the
/// storage supervisor owns that transition by clearing the store slot.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(store) = state.session_store().await else {
        warn!("storage unavailable (degraded mode)");
        return HealthResponse::degraded();
    };

    if let Err(err) = store.health_check().await {
        warn!(error = %err, "storage health check failed");
    }

    HealthResponse::ok()
}
