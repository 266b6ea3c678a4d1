//! Persistent key-value store capability
//!
//! Everything the coordinator persists goes through this interface:
//! collections of string keys mapping to opaque JSON documents. The
//! capability is deliberately small so a backend can be swapped without
//! touching the recording pipeline.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::database::DatabaseError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("invalid stored value at {collection}/{key}: {source}")]
    Corrupt {
        collection: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for storage: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store rejected the write: {0}")]
    Backend(String),
}

/// Capability interface over durable storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace one record.
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Every record in a collection. Order is unspecified; callers that
    /// care must sort.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Remove all named `(collection, key)` records in one atomic step.
    /// On error none of them are gone.
    async fn delete_many(&self, records: &[(String, String)]) -> Result<(), StoreError>;
}
