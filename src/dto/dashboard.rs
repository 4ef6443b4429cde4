//! Aggregated progress projections for the host dashboard.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::SessionStatus;

/// Everything the host dashboard shows for one session.
///
/// Recomputed from the play rows on every change notification; clients can
/// treat each snapshot as a full replacement of the previous one.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSnapshot {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub total_questions: u32,
    pub players: Vec<PlayerProgress>,
    pub generated_at: String,
}

/// One player's tallies on the dashboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerProgress {
    pub join_id: Uuid,
    /// Display name, suffixed with an ordinal when several players share it.
    pub display_name: String,
    pub correct: u32,
    pub wrong: u32,
    /// Questions not yet reached in this run.
    pub missing: u32,
    /// Whether the player has worked through every question.
    pub answered: bool,
    /// Whether the identity currently holds a live connection.
    pub active: bool,
}
