//! Message taxonomy and lossy broadcast for one page context

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::engine::{CaptureConfig, CaptureEvent, MediaChunk};

/// How many undelivered messages a page bus holds per subscriber.
const PAGE_BUS_CAPACITY: usize = 256;

/// Messages exchanged between the capture agent and its page-level peers
/// over the in-page broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Control: arm the agent and begin capturing with this configuration.
    StartRecord { config: CaptureConfig },
    /// The engine is live; `start_timestamp` anchors the recording clock.
    RecordStarted { start_timestamp: i64 },
    /// Control: stop capturing and hand back the buffers.
    StopRecord,
    /// Final authoritative buffers for the arm cycle that just ended.
    RecordStopped {
        events: Vec<CaptureEvent>,
        media_chunks: Vec<MediaChunk>,
        end_timestamp: i64,
    },
    /// Acquisition failed; the agent stays disarmed.
    RecordFailed { message: String },
    /// Best-effort forward of one captured event.
    EmitEvent { event: CaptureEvent },
    /// Best-effort forward of one media chunk.
    EmitMediaChunk { chunk: MediaChunk },
    /// The agent is subscribed and will see control messages from now on.
    RecordScriptReady,
}

impl PageMessage {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PageMessage::StartRecord { .. } => "start_record",
            PageMessage::RecordStarted { .. } => "record_started",
            PageMessage::StopRecord => "stop_record",
            PageMessage::RecordStopped { .. } => "record_stopped",
            PageMessage::RecordFailed { .. } => "record_failed",
            PageMessage::EmitEvent { .. } => "emit_event",
            PageMessage::EmitMediaChunk { .. } => "emit_media_chunk",
            PageMessage::RecordScriptReady => "record_script_ready",
        }
    }
}

/// One-to-many broadcast wiring the components of a single page context
/// together. Delivery is lossy: a message posted before a component
/// subscribes is gone, and a slow subscriber drops its oldest backlog.
#[derive(Clone)]
pub struct PageBus {
    tx: broadcast::Sender<PageMessage>,
}

impl PageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PAGE_BUS_CAPACITY);
        Self { tx }
    }

    /// Post to every current subscriber. A bus with no subscribers drops
    /// the message silently.
    pub fn post(&self, message: PageMessage) {
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.tx.subscribe()
    }
}

impl Default for PageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_tags_use_variant_names() {
        let encoded = serde_json::to_value(PageMessage::RecordStarted {
            start_timestamp: 1_000,
        })
        .unwrap();
        assert_eq!(
            encoded,
            json!({ "type": "RecordStarted", "start_timestamp": 1_000 })
        );

        let decoded: PageMessage =
            serde_json::from_value(json!({ "type": "RecordScriptReady" })).unwrap();
        assert!(matches!(decoded, PageMessage::RecordScriptReady));
    }

    #[tokio::test]
    async fn post_before_subscribe_is_lost() {
        let bus = PageBus::new();
        bus.post(PageMessage::StopRecord);

        let mut rx = bus.subscribe();
        bus.post(PageMessage::RecordScriptReady);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, PageMessage::RecordScriptReady));
        assert!(rx.try_recv().is_err());
    }
}
