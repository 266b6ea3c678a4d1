//! Library of stored sessions
//!
//! Thin typed layer over the key-value store. Session metadata lives in
//! one collection and the recorded payload in two others, all keyed by
//! the session id, so deleting a session can drop every part in a
//! single atomic batch.

use std::sync::Arc;

use uuid::Uuid;

use crate::capture::{CaptureEvent, MediaChunk};
use crate::session::Session;
use crate::store::{KeyValueStore, StoreError};

pub const SESSIONS_COLLECTION: &str = "sessions";
pub const EVENTS_COLLECTION: &str = "events";
pub const MEDIA_COLLECTION: &str = "media";

#[derive(Clone)]
pub struct SessionLibrary {
    store: Arc<dyn KeyValueStore>,
}

impl SessionLibrary {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All stored sessions, newest first.
    pub async fn get_all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();
        for (key, value) in self.store.list(SESSIONS_COLLECTION).await? {
            let session: Session =
                serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                    collection: SESSIONS_COLLECTION.to_string(),
                    key,
                    source,
                })?;
            sessions.push(session);
        }
        sessions.sort_by(|a, b| b.create_timestamp.cmp(&a.create_timestamp));
        Ok(sessions)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let key = id.to_string();
        match self.store.get(SESSIONS_COLLECTION, &key).await? {
            Some(value) => {
                let session =
                    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                        collection: SESSIONS_COLLECTION.to_string(),
                        key,
                        source,
                    })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Recorded events for a session. A session without a stored payload
    /// yields an empty list rather than an error.
    pub async fn get_events(&self, id: Uuid) -> Result<Vec<CaptureEvent>, StoreError> {
        self.get_payload(EVENTS_COLLECTION, id).await
    }

    pub async fn get_media_chunks(&self, id: Uuid) -> Result<Vec<MediaChunk>, StoreError> {
        self.get_payload(MEDIA_COLLECTION, id).await
    }

    /// Store a session with its payload. The payload goes in first and
    /// the metadata record last, so a write that dies partway through
    /// never produces a listed session with missing parts.
    pub async fn save_session(
        &self,
        session: &Session,
        events: &[CaptureEvent],
        media_chunks: &[MediaChunk],
    ) -> Result<(), StoreError> {
        let key = session.id.to_string();
        self.store
            .put(EVENTS_COLLECTION, &key, &serde_json::to_value(events)?)
            .await?;
        self.store
            .put(MEDIA_COLLECTION, &key, &serde_json::to_value(media_chunks)?)
            .await?;
        self.store
            .put(SESSIONS_COLLECTION, &key, &serde_json::to_value(session)?)
            .await
    }

    /// Delete sessions together with their payloads in one atomic batch.
    pub async fn delete_sessions(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let records: Vec<(String, String)> = ids
            .iter()
            .flat_map(|id| {
                let key = id.to_string();
                [
                    (SESSIONS_COLLECTION.to_string(), key.clone()),
                    (EVENTS_COLLECTION.to_string(), key.clone()),
                    (MEDIA_COLLECTION.to_string(), key),
                ]
            })
            .collect();
        self.store.delete_many(&records).await
    }

    async fn get_payload<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Vec<T>, StoreError> {
        let key = id.to_string();
        match self.store.get(collection, &key).await? {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                collection: collection.to_string(),
                key,
                source,
            }),
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for SessionLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLibrary").finish()
    }
}
