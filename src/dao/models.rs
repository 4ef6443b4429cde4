use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of a hosted session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players can join and play.
    Active,
    /// The host ended the round; joins and answers are over.
    Completed,
}

/// Direction of the face/name matching questions asked in a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Show a name, pick the matching photo.
    NameToPhoto,
    /// Show a photo, pick the matching name.
    PhotoToName,
}

/// Gender recorded for a roster person, used to prefer plausible distractors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// One hosted round of the game, persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Roster the questions are drawn from.
    pub roster_id: Uuid,
    /// Short join code handed out to players.
    pub code: String,
    /// Question direction for every quiz in this session.
    pub question_kind: QuestionKind,
    /// Whether the round is still running.
    pub status: SessionStatus,
    /// Number of questions each player gets.
    pub total_questions: u32,
    /// Seconds granted per question.
    pub time_limit_seconds: u32,
    /// Options shown per question, correct answer included.
    pub options_count: u32,
    /// Most recent finishing score written by any player, last writer wins.
    pub last_score: Option<u32>,
    /// Opaque host identity token recorded at creation, never interpreted.
    pub host_token: Option<String>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the session row was updated.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Fresh active session with no recorded score yet.
    pub fn new(
        roster_id: Uuid,
        code: String,
        question_kind: QuestionKind,
        total_questions: u32,
        time_limit_seconds: u32,
        options_count: u32,
        host_token: Option<String>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            roster_id,
            code,
            question_kind,
            status: SessionStatus::Active,
            total_questions,
            time_limit_seconds,
            options_count,
            last_score: None,
            host_token,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Member of a roster, read-only input to question generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonEntity {
    /// Stable identifier for the person.
    pub id: Uuid,
    /// Roster this person belongs to.
    pub roster_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    /// Reference to the person's photo asset.
    pub photo_url: String,
}

impl PersonEntity {
    /// Full display name shown on name prompts and name options.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One record of the shared participation table.
///
/// A row with `correct_person_id` unset is a join identity (the sentinel row
/// created when a player enters the session); a row with it set is one
/// answer outcome. Both kinds share the `(session_id, join_token)` scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayRowEntity {
    /// Primary key of the row.
    pub id: Uuid,
    /// Session this row belongs to.
    pub session_id: Uuid,
    /// Client-minted token distinguishing one play attempt.
    pub join_token: String,
    /// Display name the player entered when joining.
    pub player_name: String,
    /// Target person of the answered question; unset on join sentinels.
    pub correct_person_id: Option<Uuid>,
    /// Option the player picked; unset on join sentinels and timed-out answers.
    pub selected_person_id: Option<Uuid>,
    /// Whether the selected option matched the target. Always false on sentinels.
    pub is_correct: bool,
    /// Milliseconds between question display and the recorded outcome.
    pub response_time_ms: Option<u64>,
    /// Durable liveness flag for the join identity, maintained best-effort.
    pub is_active: bool,
    /// Creation timestamp, also the ordering key for per-token reads.
    pub created_at: SystemTime,
    /// Last time the row was updated.
    pub updated_at: SystemTime,
}

impl PlayRowEntity {
    /// Build a join sentinel row for a player entering a session.
    pub fn new_join(session_id: Uuid, player_name: String, join_token: String) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            join_token,
            player_name,
            correct_person_id: None,
            selected_person_id: None,
            is_correct: false,
            response_time_ms: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build an answer outcome row for one asked question.
    pub fn new_answer(
        session_id: Uuid,
        join_token: String,
        player_name: String,
        correct_person_id: Uuid,
        selected_person_id: Option<Uuid>,
        response_time_ms: u64,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            join_token,
            player_name,
            correct_person_id: Some(correct_person_id),
            selected_person_id,
            is_correct: selected_person_id == Some(correct_person_id),
            response_time_ms: Some(response_time_ms),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this row is a join identity rather than an answer outcome.
    pub fn is_join_sentinel(&self) -> bool {
        self.correct_person_id.is_none()
    }

    /// Whether this row is an answer the player actually submitted.
    ///
    /// Timed-out answers carry no selection and do not count as completed,
    /// so a reload re-asks the timed-out question.
    pub fn is_completed_answer(&self) -> bool {
        self.correct_person_id.is_some() && self.selected_person_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_rows_are_sentinels_and_never_completed() {
        let row = PlayRowEntity::new_join(Uuid::new_v4(), "Sam".into(), "token-a".into());

        assert!(row.is_join_sentinel());
        assert!(!row.is_completed_answer());
        assert!(row.is_active);
        assert!(!row.is_correct);
    }

    #[test]
    fn answer_correctness_follows_the_selection() {
        let session_id = Uuid::new_v4();
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        let hit = PlayRowEntity::new_answer(
            session_id,
            "token-a".into(),
            "Sam".into(),
            target,
            Some(target),
            1200,
        );
        let miss = PlayRowEntity::new_answer(
            session_id,
            "token-a".into(),
            "Sam".into(),
            target,
            Some(other),
            900,
        );
        let timeout = PlayRowEntity::new_answer(
            session_id,
            "token-a".into(),
            "Sam".into(),
            target,
            None,
            20_000,
        );

        assert!(hit.is_correct);
        assert!(hit.is_completed_answer());
        assert!(!miss.is_correct);
        assert!(miss.is_completed_answer());
        assert!(!timeout.is_correct);
        assert!(!timeout.is_completed_answer());
        assert!(!timeout.is_join_sentinel());
    }
}
