use crate::error::{StudyError, StudyResult};
use crate::state::AppState;
use crate::store::{Query, StoreError};
use crate::types::*;

impl AppState {
    /// Record a score event.
    ///
    /// The cache is updated before the store write, so a failed write leaves
    /// the cache ahead of the store.
    pub async fn record_score(
        &self,
        player: &str,
        request: &ScoreRequest,
    ) -> StudyResult<ScoreRecord> {
        let record = ScoreRecord::from_request(player, request, now_seconds());

        self.score_cache.insert(record.clone());

        let doc = serde_json::to_value(&record).map_err(StoreError::from)?;
        self.store.put(&new_document_id(), doc).await?;

        tracing::debug!(
            player = %player,
            rounds = record.rounds,
            ai_score = record.ai_score,
            player_score = record.player_score,
            "Recorded score"
        );
        Ok(record)
    }

    /// Look up a tracked collector record by its prediction or explanation id
    pub async fn find_by_tracked_id(
        &self,
        id_type: TrackedIdType,
        tracked_id: &str,
    ) -> StudyResult<Record> {
        let query = Query::new()
            .eq(&id_type.field_path(), tracked_id)
            .limit(1)
            .use_index(&format!("_design/{}", id_type.as_str()));

        let doc = self
            .store
            .find(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StudyError::NotFound(format!("no record with {}={}", id_type.as_str(), tracked_id))
            })?;

        Ok(serde_json::from_value(doc).map_err(StoreError::from)?)
    }
}

/// Fresh unique key for an append-only document
pub(crate) fn new_document_id() -> DocumentId {
    ulid::Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use crate::store::DocumentStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_score_writes_cache_and_store() {
        let (state, store) = test_state();

        let record = state.record_score("abc", &score(3, 10, 20)).await.unwrap();

        assert_eq!(record.player_id, "abc");
        assert_eq!(record.rounds, 3);
        assert!(record.created_at > 0.0);
        assert_eq!(state.score_cache.get("abc"), Some(record.clone()));

        let docs = store
            .find(&Query::new().eq("player_id", "abc").exists("ai_score"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["label_city"], "label-3");
    }

    #[tokio::test]
    async fn test_record_score_appends_every_submission() {
        let (state, store) = test_state();

        state.record_score("abc", &score(4, 1, 1)).await.unwrap();
        state.record_score("abc", &score(4, 2, 2)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(state.score_cache.get("abc").map(|r| r.ai_score), Some(2));
    }

    #[tokio::test]
    async fn test_find_by_tracked_id() {
        let (state, store) = test_state();
        store
            .put(
                "rec-1",
                json!({
                    "id": "rec-1",
                    "timestamp": 1.5,
                    "service": "country",
                    "data": {
                        "tracked": {
                            "data": {"response": {"decoded": {"prediction_id": "pred-7"}}}
                        }
                    }
                }),
            )
            .await
            .unwrap();

        let record = state
            .find_by_tracked_id(TrackedIdType::PredictionId, "pred-7")
            .await
            .unwrap();
        assert_eq!(record.id, "rec-1");

        let missing = state
            .find_by_tracked_id(TrackedIdType::ExplanationId, "pred-7")
            .await;
        assert!(matches!(missing, Err(StudyError::NotFound(_))));
    }
}
