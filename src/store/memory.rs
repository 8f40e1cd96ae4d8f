use super::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process document store.
///
/// Documents are kept with a write sequence number so that sort ties resolve
/// to the most recently written document first for descending sorts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<String, (u64, Value)>>>,
    seq: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Value> {
        self.docs
            .read()
            .await
            .get(key)
            .map(|(_, doc)| doc.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, doc: Value) -> StoreResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.docs.write().await.insert(key.to_string(), (seq, doc));
        Ok(())
    }

    async fn find(&self, query: &Query) -> StoreResult<Vec<Value>> {
        let docs = self.docs.read().await;
        let mut matching: Vec<&(u64, Value)> =
            docs.values().filter(|(_, doc)| query.matches(doc)).collect();

        let newest_first = query
            .sort
            .first()
            .is_some_and(|key| key.direction == SortDirection::Desc);
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            query.compare(a, b).then_with(|| {
                if newest_first {
                    seq_b.cmp(seq_a)
                } else {
                    seq_a.cmp(seq_b)
                }
            })
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, doc)| query.project(doc))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let result = store.get("nobody").await;
        assert!(matches!(result, Err(StoreError::NotFound(key)) if key == "nobody"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStore::new();
        store.put("p1", json!({"images": ["a"]})).await.unwrap();
        store.put("p1", json!({"images": ["a", "b"]})).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("p1").await.unwrap(), json!({"images": ["a", "b"]}));
    }

    #[tokio::test]
    async fn test_find_filters_sorts_and_limits() {
        let store = MemoryStore::new();
        for (key, created_at, rounds) in [("a", 1.0, 4), ("b", 3.0, 4), ("c", 2.0, 12)] {
            store
                .put(
                    key,
                    json!({"player_id": "p", "ai_score": 1, "created_at": created_at, "rounds": rounds}),
                )
                .await
                .unwrap();
        }
        store
            .put("p", json!({"player_id": "p", "images": []}))
            .await
            .unwrap();

        let query = Query::new()
            .eq("player_id", "p")
            .exists("ai_score")
            .sort_desc("created_at")
            .fields(&["created_at"])
            .limit(2);
        let docs = store.find(&query).await.unwrap();

        assert_eq!(docs, vec![json!({"created_at": 3.0}), json!({"created_at": 2.0})]);
    }

    #[tokio::test]
    async fn test_find_breaks_ties_by_write_order() {
        let store = MemoryStore::new();
        store.put("first", json!({"t": 1, "n": 1})).await.unwrap();
        store.put("second", json!({"t": 1, "n": 2})).await.unwrap();

        let desc = store.find(&Query::new().sort_desc("t")).await.unwrap();
        assert_eq!(desc[0]["n"], 2);

        let asc = store.find(&Query::new().sort_asc("t")).await.unwrap();
        assert_eq!(asc[0]["n"], 1);
    }
}
