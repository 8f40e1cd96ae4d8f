use crate::error::StudyResult;
use crate::state::AppState;
use crate::store::{Query, StoreError};
use crate::types::*;

impl AppState {
    /// Whether the player's latest score reached `total_rounds`.
    ///
    /// Checks the cache; on a miss seeds the cache with the newest score
    /// record from the store and checks the cache once more. A player with no
    /// score records has not completed.
    pub async fn has_completed(&self, player: &str, total_rounds: u32) -> StudyResult<bool> {
        if let Some(done) = self.score_cache.reached_round(player, total_rounds) {
            return Ok(done);
        }

        let Some(latest) = self.latest_score(player).await? else {
            tracing::debug!(player = %player, "No score records, not completed");
            return Ok(false);
        };

        tracing::debug!(player = %player, rounds = latest.rounds, "Seeding score cache from store");
        self.score_cache.insert(latest);

        Ok(self
            .score_cache
            .reached_round(player, total_rounds)
            .unwrap_or(false))
    }

    /// Most recent score record of a player in the store
    pub async fn latest_score(&self, player: &str) -> StudyResult<Option<ScoreRecord>> {
        let query = Query::new()
            .eq("player_id", player)
            .exists("ai_score")
            .fields(SCORE_FIELDS)
            .sort_desc("created_at")
            .limit(1)
            .use_index(PLAYER_INDEX);

        match self.store.find(&query).await?.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::state::test_support::*;
    use crate::store::DocumentStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_player_has_not_completed() {
        let (state, _store) = test_state();
        for total in [1, 5, 17] {
            assert!(!state.has_completed("nobody", total).await.unwrap());
        }
        assert!(state.score_cache.is_empty());
    }

    #[tokio::test]
    async fn test_completion_from_cache() {
        let (state, _store) = test_state();
        state.record_score("p", &score(5, 0, 0)).await.unwrap();

        assert!(state.has_completed("p", 5).await.unwrap());
        assert!(!state.has_completed("p", 6).await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_after_restart_seeds_cache_from_newest_record() {
        let (state, store) = test_state();
        put_record(&store, "p", 1.0, &score(17, 0, 0)).await;
        put_record(&store, "p", 2.0, &score(12, 0, 0)).await;

        let restarted = state.restarted();
        assert!(restarted.score_cache.get("p").is_none());

        assert!(!restarted.has_completed("p", 17).await.unwrap());
        assert_eq!(restarted.score_cache.get("p").map(|r| r.rounds), Some(12));
        assert!(restarted.has_completed("p", 12).await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_ignores_experiment_records() {
        let (state, store) = test_state();
        store
            .put("p", json!({"player_id": "p", "created_at": 9.0, "images": ["img-1"]}))
            .await
            .unwrap();

        assert!(!state.has_completed("p", 1).await.unwrap());
        assert!(state.score_cache.get("p").is_none());
    }

    #[tokio::test]
    async fn test_cache_answers_after_seeding() {
        let (state, store) = test_state();
        put_record(&store, "p", 1.0, &score(5, 0, 0)).await;

        assert!(state.has_completed("p", 5).await.unwrap());

        // Newer records that bypass the cache are not seen once it is seeded
        put_record(&store, "p", 2.0, &score(9, 0, 0)).await;
        assert!(!state.has_completed("p", 9).await.unwrap());
    }
}
