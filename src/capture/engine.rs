//! Capture engine capability interface and the data it produces

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// A single timestamped record produced by the capture engine. The
/// coordinator never looks inside `payload`; `timestamp` is the only field
/// it reads or rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub timestamp: i64,
    pub payload: Value,
}

impl CaptureEvent {
    pub fn new(timestamp: i64, payload: Value) -> Self {
        Self { timestamp, payload }
    }
}

/// Opaque ordered binary fragment from the media recorder. Serialized as
/// base64 in JSON so session archives stay plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaChunk {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl MediaChunk {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// What the page hands the engine when a recording begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Record embedded cross-origin frames through the engine's own relay.
    pub record_cross_origin_frames: bool,
    /// Ask for a microphone stream alongside the event capture.
    pub record_audio: bool,
    /// How often the media recorder hands over a chunk.
    pub media_timeslice_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            record_cross_origin_frames: true,
            record_audio: true,
            media_timeslice_ms: 1_000,
        }
    }
}

/// Where a running engine delivers its output.
#[derive(Clone)]
pub struct CaptureSink {
    events: mpsc::UnboundedSender<CaptureEvent>,
    media: mpsc::UnboundedSender<MediaChunk>,
}

impl CaptureSink {
    /// Build a sink plus the receiving side its owner drains.
    pub fn pair() -> (CaptureSink, CaptureStream) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        (
            CaptureSink {
                events: events_tx,
                media: media_tx,
            },
            CaptureStream {
                events: events_rx,
                media: media_rx,
            },
        )
    }

    pub fn push_event(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }

    pub fn push_media(&self, chunk: MediaChunk) {
        let _ = self.media.send(chunk);
    }
}

/// Receiving side of a [`CaptureSink`].
pub struct CaptureStream {
    pub events: mpsc::UnboundedReceiver<CaptureEvent>,
    pub media: mpsc::UnboundedReceiver<MediaChunk>,
}

/// Identifies one engine run between start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Device or permission acquisition failed; the recording never starts.
    #[error("capture acquisition failed: {0}")]
    Acquisition(String),
    #[error("no capture run for handle {0:?}")]
    UnknownHandle(EngineHandle),
}

/// Capability interface a concrete capture library satisfies to plug into
/// the coordinator. The coordinator never sees anything of the engine
/// beyond these two calls and the sink traffic.
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    /// Begin producing into `sink`. Resolves only once capture is actually
    /// live, after any permission prompts, so completion means "output has
    /// begun" rather than "start was requested".
    async fn start(
        &self,
        config: CaptureConfig,
        sink: CaptureSink,
    ) -> Result<EngineHandle, CaptureError>;

    /// Stop the run behind `handle`. Resolves only after the device has
    /// flushed its final buffered chunk into the sink.
    async fn stop(&self, handle: EngineHandle) -> Result<(), CaptureError>;
}
