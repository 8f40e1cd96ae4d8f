//! Client for the experiment tracking collector.
//!
//! The collector stores the responses the original geolocation model gave for
//! every study image. The backend never runs inference itself; it replays those
//! recorded answers.

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::store::query::lookup;
use crate::types::Record;

/// Result type for collector operations
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors that can occur while fetching recorded responses
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollectorError {
    #[error("Collector request failed: {0}")]
    ApiError(String),

    #[error("Collector request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Recorded response not found: {0}")]
    NotFound(String),

    #[error("Recorded response is malformed: {0}")]
    MalformedRecord(String),
}

/// Trait for anything that can hand out recorded collector entries
#[async_trait]
pub trait ResponseCollector: Send + Sync {
    async fn fetch_record(&self, identifier: &str) -> CollectorResult<Record>;
}

/// Collector reached over HTTP (`GET {base_url}/get/{identifier}`)
pub struct HttpCollector {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpCollector {
    pub fn new(base_url: String, timeout: Duration) -> CollectorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::ApiError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl ResponseCollector for HttpCollector {
    async fn fetch_record(&self, identifier: &str) -> CollectorResult<Record> {
        let url = format!("{}/get/{}", self.base_url, identifier);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                CollectorError::Timeout(self.timeout)
            } else {
                CollectorError::ApiError(e.to_string())
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CollectorError::NotFound(identifier.to_string()));
        }
        if !response.status().is_success() {
            return Err(CollectorError::ApiError(format!(
                "Collector returned status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CollectorError::MalformedRecord(e.to_string()))
    }
}

/// Memoizing wrapper: identical identifiers always resolve to the same record
pub struct MemoizedCollector {
    inner: Arc<dyn ResponseCollector>,
    cache: Cache<String, Record>,
}

impl MemoizedCollector {
    pub fn new(inner: Arc<dyn ResponseCollector>, max_entries: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(max_entries),
        }
    }
}

#[async_trait]
impl ResponseCollector for MemoizedCollector {
    async fn fetch_record(&self, identifier: &str) -> CollectorResult<Record> {
        self.cache
            .try_get_with(identifier.to_string(), self.inner.fetch_record(identifier))
            .await
            .map_err(|e: Arc<CollectorError>| (*e).clone())
    }
}

/// The decoded model answer inside a tracked record
pub fn decoded_response(record: &Record) -> CollectorResult<Value> {
    record
        .data
        .get("tracked")
        .and_then(|tracked| tracked.get("data"))
        .and_then(|data| lookup(data, "response.decoded"))
        .cloned()
        .ok_or_else(|| {
            CollectorError::MalformedRecord(format!(
                "record {} has no data.tracked.data.response.decoded",
                record.id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCollector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResponseCollector for CountingCollector {
        async fn fetch_record(&self, identifier: &str) -> CollectorResult<Record> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if identifier == "missing" {
                return Err(CollectorError::NotFound(identifier.to_string()));
            }
            Ok(sample_record(identifier))
        }
    }

    fn sample_record(id: &str) -> Record {
        serde_json::from_value(json!({
            "id": id,
            "timestamp": 1.0,
            "service": "country",
            "data": {
                "tracked": {
                    "data": {"response": {"decoded": {"prediction_id": id, "country": "DE"}}}
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_memoized_collector_fetches_once() {
        let inner = Arc::new(CountingCollector {
            calls: AtomicUsize::new(0),
        });
        let collector = MemoizedCollector::new(inner.clone(), 16);

        let first = collector.fetch_record("p-1").await.unwrap();
        let second = collector.fetch_record("p-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memoized_collector_does_not_cache_errors() {
        let inner = Arc::new(CountingCollector {
            calls: AtomicUsize::new(0),
        });
        let collector = MemoizedCollector::new(inner.clone(), 16);

        assert!(collector.fetch_record("missing").await.is_err());
        assert!(collector.fetch_record("missing").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_decoded_response() {
        let record = sample_record("p-2");
        assert_eq!(
            decoded_response(&record).unwrap(),
            json!({"prediction_id": "p-2", "country": "DE"})
        );

        let mut broken = record.clone();
        broken.data.remove("tracked");
        assert!(matches!(
            decoded_response(&broken),
            Err(CollectorError::MalformedRecord(_))
        ));
    }
}
