//! Deterministic in-process capture engine
//!
//! Implements the [`CaptureEngine`] capability without touching any real
//! device. Output is driven by hand through [`ScriptedEngine::emit_event`]
//! and [`ScriptedEngine::emit_media`], and interactions are observable
//! through the captured accessors, which makes it the engine of choice for
//! tests and headless embedding.
//!
//! # Example
//!
//! ```ignore
//! let clock = ManualClock::new(0);
//! let engine = Arc::new(
//!     ScriptedEngine::new(clock.clone())
//!         .with_config(ScriptedConfig::default().with_final_flush(vec![chunk])),
//! );
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::engine::{
    CaptureConfig, CaptureEngine, CaptureError, CaptureEvent, CaptureSink, EngineHandle,
    MediaChunk,
};
use crate::util::Clock;

/// Configuration for [`ScriptedEngine`] behavior.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfig {
    /// Fail every `start` call with this acquisition error.
    pub fail_acquisition: Option<String>,
    /// Simulated permission-prompt delay before `start` resolves.
    pub acquisition_delay: Duration,
    /// Simulated device-teardown delay inside `stop`.
    pub stop_delay: Duration,
    /// Chunks the device flushes into the sink while stopping.
    pub final_flush: Vec<MediaChunk>,
}

impl ScriptedConfig {
    /// Make every acquisition fail with the given message.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.fail_acquisition = Some(message.into());
        self
    }

    pub fn with_acquisition_delay(mut self, delay: Duration) -> Self {
        self.acquisition_delay = delay;
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn with_final_flush(mut self, chunks: Vec<MediaChunk>) -> Self {
        self.final_flush = chunks;
        self
    }
}

/// Scripted capture engine that records all interactions.
pub struct ScriptedEngine {
    config: ScriptedConfig,
    clock: Arc<dyn Clock>,
    next_handle: AtomicU64,
    live: Mutex<HashMap<u64, CaptureSink>>,
    started: Mutex<Vec<CaptureConfig>>,
    stopped: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            config: ScriptedConfig::default(),
            clock,
            next_handle: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            stopped: AtomicUsize::new(0),
        }
    }

    pub fn with_config(mut self, config: ScriptedConfig) -> Self {
        self.config = config;
        self
    }

    /// Push one event into the live run, stamped with the current clock.
    /// Returns false when nothing is live.
    pub fn emit_event(&self, payload: Value) -> bool {
        let live = self.live.lock();
        match live.values().next() {
            Some(sink) => {
                sink.push_event(CaptureEvent::new(self.clock.now_ms(), payload));
                true
            }
            None => false,
        }
    }

    /// Push one media chunk into the live run. Returns false when nothing
    /// is live.
    pub fn emit_media(&self, data: impl Into<Vec<u8>>) -> bool {
        let live = self.live.lock();
        match live.values().next() {
            Some(sink) => {
                sink.push_media(MediaChunk::new(data));
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.live.lock().is_empty()
    }

    /// Configurations passed to `start`, in call order, including failed
    /// acquisitions.
    pub fn started_configs(&self) -> Vec<CaptureConfig> {
        self.started.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.started.lock().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureEngine for ScriptedEngine {
    async fn start(
        &self,
        config: CaptureConfig,
        sink: CaptureSink,
    ) -> Result<EngineHandle, CaptureError> {
        self.started.lock().push(config);

        if let Some(message) = &self.config.fail_acquisition {
            return Err(CaptureError::Acquisition(message.clone()));
        }
        if !self.config.acquisition_delay.is_zero() {
            tokio::time::sleep(self.config.acquisition_delay).await;
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(id, sink);
        Ok(EngineHandle(id))
    }

    async fn stop(&self, handle: EngineHandle) -> Result<(), CaptureError> {
        if !self.config.stop_delay.is_zero() {
            tokio::time::sleep(self.config.stop_delay).await;
        }

        let Some(sink) = self.live.lock().remove(&handle.0) else {
            return Err(CaptureError::UnknownHandle(handle));
        };
        // The device hands over its last buffered chunks during teardown.
        for chunk in &self.config.final_flush {
            sink.push_media(chunk.clone());
        }
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
