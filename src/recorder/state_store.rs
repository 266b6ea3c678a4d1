//! Durable recorder state with live change notification
//!
//! One [`StateStore`] is shared by every context. The orchestrator writes
//! it on each transition; frame mirrors and control surfaces follow it
//! through a watch subscription. Writes persist to the key-value store so
//! a reload or a coordinator restart can recover an interrupted recording.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::state::RecorderState;
use super::timeline::BufferedTimeline;
use crate::store::{KeyValueStore, StoreError};

pub const RECORDER_COLLECTION: &str = "recorder";
const STATE_KEY: &str = "state";
const BUFFERED_EVENTS_KEY: &str = "buffered_events";
const BUFFERED_MEDIA_KEY: &str = "buffered_media";

pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    current: watch::Sender<RecorderState>,
}

impl StateStore {
    /// Load persisted state, or start idle on a fresh store.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Arc<Self>, StoreError> {
        let state = match store.get(RECORDER_COLLECTION, STATE_KEY).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                    collection: RECORDER_COLLECTION.to_string(),
                    key: STATE_KEY.to_string(),
                    source,
                })?
            }
            None => RecorderState::default(),
        };
        debug!(status = ?state.status, "recorder state loaded");
        let (current, _) = watch::channel(state);
        Ok(Arc::new(Self { store, current }))
    }

    pub fn state(&self) -> RecorderState {
        self.current.borrow().clone()
    }

    /// Followers see every write, in order.
    pub fn subscribe(&self) -> watch::Receiver<RecorderState> {
        self.current.subscribe()
    }

    /// Persist then publish. Publication happens even when persistence
    /// fails so live followers never diverge from the coordinator.
    pub async fn write(&self, state: RecorderState) -> Result<(), StoreError> {
        let value = serde_json::to_value(&state)?;
        let persisted = self.store.put(RECORDER_COLLECTION, STATE_KEY, &value).await;
        debug!(status = ?state.status, ok = persisted.is_ok(), "recorder state written");
        self.current.send_replace(state);
        persisted
    }

    /// Persist the buffers a paused or interrupted recording will continue
    /// from.
    pub async fn write_buffered(&self, timeline: &BufferedTimeline) -> Result<(), StoreError> {
        let events = serde_json::to_value(&timeline.events)?;
        let media = serde_json::to_value(&timeline.media_chunks)?;
        self.store
            .put(RECORDER_COLLECTION, BUFFERED_EVENTS_KEY, &events)
            .await?;
        self.store
            .put(RECORDER_COLLECTION, BUFFERED_MEDIA_KEY, &media)
            .await
    }

    /// Buffers persisted by the last pause or unload flush; empty when
    /// nothing was persisted.
    pub async fn read_buffered(&self) -> Result<BufferedTimeline, StoreError> {
        let events = match self
            .store
            .get(RECORDER_COLLECTION, BUFFERED_EVENTS_KEY)
            .await?
        {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                collection: RECORDER_COLLECTION.to_string(),
                key: BUFFERED_EVENTS_KEY.to_string(),
                source,
            })?,
            None => Vec::new(),
        };
        let media_chunks = match self
            .store
            .get(RECORDER_COLLECTION, BUFFERED_MEDIA_KEY)
            .await?
        {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                collection: RECORDER_COLLECTION.to_string(),
                key: BUFFERED_MEDIA_KEY.to_string(),
                source,
            })?,
            None => Vec::new(),
        };
        Ok(BufferedTimeline::new(events, media_chunks))
    }

    pub async fn clear_buffered(&self) -> Result<(), StoreError> {
        self.store
            .delete_many(&[
                (RECORDER_COLLECTION.to_string(), BUFFERED_EVENTS_KEY.to_string()),
                (RECORDER_COLLECTION.to_string(), BUFFERED_MEDIA_KEY.to_string()),
            ])
            .await
    }
}
