//! Join identity resolution for the player flow.
//!
//! Joining must survive reloads, rapid double-submission and explicit
//! restarts without ever splitting one player across two identities. The
//! decision tree runs retry reclaim, then token lookup, then an atomic
//! insert-or-fetch, and every path ends on exactly one stored identity.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        models::PlayRowEntity,
        session_store::{JoinResolution, SessionStore},
    },
    error::ServiceError,
};

/// Parameters of one join attempt.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub session_id: Uuid,
    pub player_name: String,
    /// Client-minted token; regenerated only on an explicit restart.
    pub join_token: String,
    /// Client believes it is re-entering rather than starting fresh.
    pub retry: bool,
}

/// Which branch of the decision tree produced the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPath {
    /// Retry reclaimed an earlier identity that had made no progress.
    ReusedPristine,
    /// The supplied token matched a stored identity.
    ResumedByToken,
    /// A fresh identity row was inserted.
    Created,
    /// The insert raced a concurrent join; the stored row won.
    AdoptedExisting,
}

/// Outcome of join resolution.
#[derive(Debug, Clone)]
pub struct ResolvedJoin {
    /// The single identity this attempt plays under. Its `join_token` is
    /// authoritative and may differ from the one the client supplied.
    pub identity: PlayRowEntity,
    /// Zero-based index of the first question still to be asked.
    pub resume_index: usize,
    pub path: JoinPath,
}

/// Resolve a join attempt to exactly one identity.
///
/// Safe under at-least-once invocation: concurrent calls with the same
/// `(session_id, join_token)` converge on a single stored row.
pub async fn resolve_join(
    store: &Arc<dyn SessionStore>,
    request: JoinRequest,
) -> Result<ResolvedJoin, ServiceError> {
    // A retry first tries to reclaim the newest identity under this name
    // that never completed an answer, so an aborted first attempt does not
    // leave a ghost player on the dashboard.
    if request.retry {
        let joins = store
            .joins_for_player(request.session_id, request.player_name.clone())
            .await?;
        for identity in joins.into_iter().rev() {
            let completed =
                count_completed(store, request.session_id, &identity.join_token).await?;
            if completed == 0 {
                store
                    .set_join_activity(request.session_id, identity.join_token.clone(), true)
                    .await?;
                info!(
                    session_id = %request.session_id,
                    player = %request.player_name,
                    "retry reclaimed a pristine identity"
                );
                return Ok(ResolvedJoin {
                    identity,
                    resume_index: 0,
                    path: JoinPath::ReusedPristine,
                });
            }
        }
    }

    if let Some(identity) = store
        .find_join(request.session_id, request.join_token.clone())
        .await?
    {
        store
            .set_join_activity(request.session_id, identity.join_token.clone(), true)
            .await?;
        let resume_index = resume_index_for(store, &request, &identity).await?;
        info!(
            session_id = %request.session_id,
            player = %request.player_name,
            resume_index,
            "join resumed by token"
        );
        return Ok(ResolvedJoin {
            identity,
            resume_index,
            path: JoinPath::ResumedByToken,
        });
    }

    let candidate = PlayRowEntity::new_join(
        request.session_id,
        request.player_name.clone(),
        request.join_token.clone(),
    );
    match store.create_join(candidate).await? {
        JoinResolution::Created(identity) => {
            info!(
                session_id = %request.session_id,
                player = %request.player_name,
                "join created a new identity"
            );
            Ok(ResolvedJoin {
                identity,
                resume_index: 0,
                path: JoinPath::Created,
            })
        }
        JoinResolution::Existing(identity) => {
            store
                .set_join_activity(request.session_id, identity.join_token.clone(), true)
                .await?;
            let resume_index = resume_index_for(store, &request, &identity).await?;
            info!(
                session_id = %request.session_id,
                player = %request.player_name,
                resume_index,
                "join adopted a concurrently created identity"
            );
            Ok(ResolvedJoin {
                identity,
                resume_index,
                path: JoinPath::AdoptedExisting,
            })
        }
    }
}

/// Where the quiz picks up for an existing identity.
///
/// A retry always starts over; otherwise the player resumes after their
/// completed answers. Timed-out questions never count as completed, so they
/// are asked again.
async fn resume_index_for(
    store: &Arc<dyn SessionStore>,
    request: &JoinRequest,
    identity: &PlayRowEntity,
) -> Result<usize, ServiceError> {
    if request.retry {
        return Ok(0);
    }
    count_completed(store, request.session_id, &identity.join_token).await
}

async fn count_completed(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    join_token: &str,
) -> Result<usize, ServiceError> {
    let answers = store
        .answers_for_join(session_id, join_token.to_owned())
        .await?;
    Ok(answers.iter().filter(|row| row.is_completed_answer()).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::session_store::memory::MemorySessionStore;

    fn arc_store() -> Arc<dyn SessionStore> {
        Arc::new(MemorySessionStore::default())
    }

    fn request(token: &str, retry: bool) -> JoinRequest {
        JoinRequest {
            session_id: Uuid::nil(),
            player_name: "Ada".to_owned(),
            join_token: token.to_owned(),
            retry,
        }
    }

    async fn record_completed_answer(store: &Arc<dyn SessionStore>, token: &str) {
        let target = Uuid::new_v4();
        store
            .insert_answer(PlayRowEntity::new_answer(
                Uuid::nil(),
                token.to_owned(),
                "Ada".to_owned(),
                target,
                Some(target),
                1200,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_join_creates_a_fresh_identity() {
        let store = arc_store();

        let resolved = resolve_join(&store, request("tok-a", false)).await.unwrap();

        assert_eq!(resolved.path, JoinPath::Created);
        assert_eq!(resolved.resume_index, 0);
        assert_eq!(resolved.identity.join_token, "tok-a");
    }

    #[tokio::test]
    async fn concurrent_joins_converge_on_one_identity() {
        let store = arc_store();

        let (first, second) = tokio::join!(
            resolve_join(&store, request("tok-a", false)),
            resolve_join(&store, request("tok-a", false)),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.identity.id, second.identity.id);
        let created = [first.path, second.path]
            .iter()
            .filter(|path| **path == JoinPath::Created)
            .count();
        assert_eq!(created, 1, "exactly one call wins the insert");

        let joins = store
            .joins_for_player(Uuid::nil(), "Ada".to_owned())
            .await
            .unwrap();
        assert_eq!(joins.len(), 1);
    }

    #[tokio::test]
    async fn reload_resumes_after_completed_answers() {
        let store = arc_store();
        resolve_join(&store, request("tok-a", false)).await.unwrap();
        record_completed_answer(&store, "tok-a").await;
        record_completed_answer(&store, "tok-a").await;
        // A timed-out answer carries no selection and must not advance the
        // resume point.
        store
            .insert_answer(PlayRowEntity::new_answer(
                Uuid::nil(),
                "tok-a".to_owned(),
                "Ada".to_owned(),
                Uuid::new_v4(),
                None,
                20_000,
            ))
            .await
            .unwrap();

        let resolved = resolve_join(&store, request("tok-a", false)).await.unwrap();

        assert_eq!(resolved.path, JoinPath::ResumedByToken);
        assert_eq!(resolved.resume_index, 2);
    }

    #[tokio::test]
    async fn restart_with_fresh_token_starts_a_second_run() {
        let store = arc_store();
        resolve_join(&store, request("tok-a", false)).await.unwrap();
        record_completed_answer(&store, "tok-a").await;

        let resolved = resolve_join(&store, request("tok-b", true)).await.unwrap();

        assert_eq!(resolved.path, JoinPath::Created);
        assert_eq!(resolved.resume_index, 0);
        assert_eq!(resolved.identity.join_token, "tok-b");

        let joins = store
            .joins_for_player(Uuid::nil(), "Ada".to_owned())
            .await
            .unwrap();
        assert_eq!(joins.len(), 2, "the old run stays on the dashboard");
    }

    #[tokio::test]
    async fn retry_reclaims_a_pristine_identity_under_its_old_token() {
        let store = arc_store();
        resolve_join(&store, request("tok-a", false)).await.unwrap();

        let resolved = resolve_join(&store, request("tok-fresh", true)).await.unwrap();

        assert_eq!(resolved.path, JoinPath::ReusedPristine);
        assert_eq!(resolved.identity.join_token, "tok-a");

        let joins = store
            .joins_for_player(Uuid::nil(), "Ada".to_owned())
            .await
            .unwrap();
        assert_eq!(joins.len(), 1, "no duplicate identity was created");
    }

    #[tokio::test]
    async fn retry_skips_identities_that_made_progress() {
        let store = arc_store();
        resolve_join(&store, request("tok-old", false)).await.unwrap();
        record_completed_answer(&store, "tok-old").await;
        resolve_join(&store, request("tok-idle", false)).await.unwrap();

        let resolved = resolve_join(&store, request("tok-fresh", true)).await.unwrap();

        assert_eq!(resolved.path, JoinPath::ReusedPristine);
        assert_eq!(resolved.identity.join_token, "tok-idle");
    }
}
