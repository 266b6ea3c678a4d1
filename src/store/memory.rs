//! In-memory store backend
//!
//! Keeps every record in a process-local map. Used by tests and by
//! ephemeral runs that should leave nothing on disk. Write failures can
//! be injected to exercise the persistence error paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::kv::{KeyValueStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(String, String), Value>>,
    // Remaining successful puts before injected failures kick in.
    fail_after: Mutex<Option<usize>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `remaining` puts succeed, then fail every put until
    /// [`MemoryStore::clear_failure`] is called.
    pub fn fail_puts_after(&self, remaining: usize) {
        *self.fail_after.lock() = Some(remaining);
    }

    pub fn clear_failure(&self) {
        *self.fail_after.lock() = None;
    }

    /// Number of successful puts so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check_write_allowed(&self) -> Result<(), StoreError> {
        let mut fail_after = self.fail_after.lock();
        match fail_after.as_mut() {
            Some(0) => Err(StoreError::Backend("injected write failure".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        self.check_write_allowed()?;
        self.records
            .lock()
            .insert((collection.to_string(), key.to_string()), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .records
            .lock()
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.records
            .lock()
            .remove(&(collection.to_string(), key.to_string()));
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete_many(&self, records: &[(String, String)]) -> Result<(), StoreError> {
        let mut map = self.records.lock();
        for (collection, key) in records {
            map.remove(&(collection.clone(), key.clone()));
        }
        Ok(())
    }
}
