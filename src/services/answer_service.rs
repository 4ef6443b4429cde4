//! Answer recording and score derivation.
//!
//! Scores are never trusted from memory or from the client. Whenever a
//! final number is needed it is recounted from the stored answer rows, so a
//! reload or reconnect cannot inflate or lose points.

use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    dao::{models::PlayRowEntity, session_store::SessionStore},
    error::ServiceError,
};

/// One answer outcome ready to be written.
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    pub session_id: Uuid,
    pub join_token: String,
    pub player_name: String,
    /// Zero-based ordinal of the answered question, for logging only.
    pub question_index: usize,
    pub correct_person_id: Uuid,
    /// Unset when the countdown expired without a pick.
    pub selected_person_id: Option<Uuid>,
    pub response_time_ms: u64,
}

/// Persist one answer outcome.
pub async fn record_answer(
    store: &Arc<dyn SessionStore>,
    record: AnswerRecord,
) -> Result<PlayRowEntity, ServiceError> {
    if record.join_token.is_empty() {
        error!(
            session_id = %record.session_id,
            index = record.question_index,
            "refusing to record an answer without a join token"
        );
        return Err(ServiceError::InvalidState(
            "answers require a resolved join identity".to_owned(),
        ));
    }

    let row = PlayRowEntity::new_answer(
        record.session_id,
        record.join_token,
        record.player_name,
        record.correct_person_id,
        record.selected_person_id,
        record.response_time_ms,
    );
    store.insert_answer(row.clone()).await?;
    Ok(row)
}

/// Count of correct answers for one identity, straight from the store.
pub async fn authoritative_score(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    join_token: &str,
) -> Result<u32, ServiceError> {
    let answers = store
        .answers_for_join(session_id, join_token.to_owned())
        .await?;
    Ok(answers.iter().filter(|row| row.is_correct).count() as u32)
}

/// Recount the score from the store and write it onto the session.
///
/// Last writer wins when several players finish; the session keeps a single
/// most-recent score.
pub async fn finalize_score(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    join_token: &str,
) -> Result<u32, ServiceError> {
    let score = authoritative_score(store, session_id, join_token).await?;
    let existed = store.record_session_score(session_id, score).await?;
    if !existed {
        warn!(%session_id, "score recorded for a session that no longer exists");
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        models::{QuestionKind, SessionEntity},
        session_store::memory::MemorySessionStore,
    };

    fn arc_store() -> Arc<dyn SessionStore> {
        Arc::new(MemorySessionStore::default())
    }

    fn record(token: &str, correct: Uuid, selected: Option<Uuid>) -> AnswerRecord {
        AnswerRecord {
            session_id: Uuid::nil(),
            join_token: token.to_owned(),
            player_name: "Ada".to_owned(),
            question_index: 0,
            correct_person_id: correct,
            selected_person_id: selected,
            response_time_ms: 1500,
        }
    }

    #[tokio::test]
    async fn hits_and_misses_mark_correctness() {
        let store = arc_store();
        let target = Uuid::new_v4();

        let hit = record_answer(&store, record("tok", target, Some(target)))
            .await
            .unwrap();
        let miss = record_answer(&store, record("tok", target, Some(Uuid::new_v4())))
            .await
            .unwrap();
        let timeout = record_answer(&store, record("tok", target, None))
            .await
            .unwrap();

        assert!(hit.is_correct);
        assert!(!miss.is_correct);
        assert!(!timeout.is_correct);
        assert!(!timeout.is_completed_answer(), "timeouts are re-asked on reload");
    }

    #[tokio::test]
    async fn answers_without_an_identity_are_refused() {
        let store = arc_store();

        let result = record_answer(&store, record("", Uuid::new_v4(), None)).await;

        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn finalize_recounts_from_the_store() {
        let store = arc_store();
        let session = SessionEntity::new(
            Uuid::new_v4(),
            "7XKQ2M".to_owned(),
            QuestionKind::PhotoToName,
            3,
            20,
            4,
            None,
        );
        let session_id = session.id;
        store.insert_session(session).await.unwrap();

        let target = Uuid::new_v4();
        for selected in [Some(target), Some(target), Some(Uuid::new_v4())] {
            let mut answer = record("tok", target, selected);
            answer.session_id = session_id;
            record_answer(&store, answer).await.unwrap();
        }

        let score = finalize_score(&store, session_id, "tok").await.unwrap();
        assert_eq!(score, 2);

        let stored = store.find_session(session_id).await.unwrap().unwrap();
        assert_eq!(stored.last_score, Some(2));
    }

    #[tokio::test]
    async fn finalize_tolerates_a_vanished_session() {
        let store = arc_store();
        let target = Uuid::new_v4();
        record_answer(&store, record("tok", target, Some(target)))
            .await
            .unwrap();

        let score = finalize_score(&store, Uuid::nil(), "tok").await.unwrap();

        assert_eq!(score, 1, "the player still gets their count");
    }
}
