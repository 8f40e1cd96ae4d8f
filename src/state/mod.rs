mod aggregate;
mod attention;
mod cache;
mod completion;
pub mod export;
mod locks;
mod replay;
mod round;
mod score;

pub use aggregate::aggregate_checkpoints;
pub use attention::{evaluate_control_attempts, AttentionCheck, ControlAttempt};
pub use cache::ScoreCache;
pub use locks::PlayerLocks;

use crate::catalog::ImageCatalog;
use crate::collector::ResponseCollector;
use crate::config::StudyConfig;
use crate::store::DocumentStore;
use std::sync::Arc;

/// Shared application state.
///
/// The store is the system of record; the score cache only remembers each
/// player's latest submission and is rebuilt lazily from the store after a
/// restart.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub score_cache: ScoreCache,
    pub catalog: Arc<ImageCatalog>,
    pub collector: Arc<dyn ResponseCollector>,
    pub study: StudyConfig,
    player_locks: PlayerLocks,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<ImageCatalog>,
        collector: Arc<dyn ResponseCollector>,
        study: StudyConfig,
    ) -> Self {
        Self {
            store,
            score_cache: ScoreCache::new(),
            catalog,
            collector,
            study,
            player_locks: PlayerLocks::new(),
        }
    }

    /// Same store, catalog and collector with a fresh, empty score cache,
    /// as after a process restart
    pub fn restarted(&self) -> Self {
        Self {
            score_cache: ScoreCache::new(),
            player_locks: PlayerLocks::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::tests::catalog_json;
    use crate::collector::{CollectorError, CollectorResult};
    use crate::store::{MemoryStore, Query, StoreError, StoreResult};
    use crate::types::{Record, ScoreRecord, ScoreRequest};
    use serde_json::Value;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Collector answering every identifier with a canned record
    pub(crate) struct FakeCollector;

    #[async_trait]
    impl ResponseCollector for FakeCollector {
        async fn fetch_record(&self, identifier: &str) -> CollectorResult<Record> {
            if identifier.is_empty() {
                return Err(CollectorError::NotFound(identifier.to_string()));
            }
            Ok(serde_json::from_value(serde_json::json!({
                "id": identifier,
                "timestamp": 0.0,
                "service": "country",
                "data": {
                    "tracked": {"data": {"response": {"decoded": {"id": identifier}}}}
                }
            }))
            .expect("valid record"))
        }
    }

    /// Store whose backend is down: every call fails with `Unavailable`
    pub(crate) struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn get(&self, key: &str) -> StoreResult<Value> {
            Err(StoreError::Unavailable(format!("get {}: connection refused", key)))
        }

        async fn put(&self, key: &str, _doc: Value) -> StoreResult<()> {
            Err(StoreError::Unavailable(format!("put {}: connection refused", key)))
        }

        async fn find(&self, _query: &Query) -> StoreResult<Vec<Value>> {
            Err(StoreError::Unavailable("_find: connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    pub(crate) fn state_with_store(store: Arc<dyn DocumentStore>) -> AppState {
        let catalog = ImageCatalog::from_json(&catalog_json(16), PathBuf::new(), 15)
            .expect("valid catalog");
        let study = StudyConfig {
            response_delay: Duration::ZERO,
            ..StudyConfig::default()
        };
        AppState::new(store, Arc::new(catalog), Arc::new(FakeCollector), study)
    }

    pub(crate) fn test_state() -> (AppState, MemoryStore) {
        let store = MemoryStore::new();
        (state_with_store(Arc::new(store.clone())), store)
    }

    pub(crate) fn score(rounds: u32, ai_score: i64, player_score: i64) -> ScoreRequest {
        ScoreRequest {
            ai_score,
            player_score,
            rounds,
            prediction_city: format!("prediction-{}", rounds),
            label_city: format!("label-{}", rounds),
            user_city_answer: format!("answer-{}", rounds),
        }
    }

    /// Persist a score record with an explicit timestamp, bypassing the cache
    pub(crate) async fn put_record(
        store: &MemoryStore,
        player: &str,
        created_at: f64,
        request: &ScoreRequest,
    ) {
        let record = ScoreRecord::from_request(player, request, created_at);
        store
            .put(
                &ulid::Ulid::new().to_string(),
                serde_json::to_value(record).expect("serializable"),
            )
            .await
            .expect("memory store accepts writes");
    }
}
