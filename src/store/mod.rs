//! Document store collaborators.
//!
//! The study backend persists everything as schema-less JSON documents. The
//! [`DocumentStore`] trait is the seam: [`CouchStore`] talks to CouchDB in
//! production, [`MemoryStore`] serves tests and local runs.

mod couch;
mod memory;
pub mod query;

use async_trait::async_trait;
use serde_json::Value;

pub use couch::{CouchConfig, CouchStore};
pub use memory::MemoryStore;
pub use query::{Condition, Operator, Query, SortDirection, SortKey};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the document store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Backend unreachable or failing; callers may retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Update conflict on document {0}")]
    Conflict(String),

    #[error("Invalid document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

/// Trait that every document store backend implements
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by key
    async fn get(&self, key: &str) -> StoreResult<Value>;

    /// Insert or replace the document stored under `key`
    async fn put(&self, key: &str, doc: Value) -> StoreResult<()>;

    /// Documents matching the query, sorted and limited as requested
    async fn find(&self, query: &Query) -> StoreResult<Vec<Value>>;

    /// Name of this backend, for logging
    fn name(&self) -> &str;
}
