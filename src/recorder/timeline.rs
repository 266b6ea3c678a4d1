//! Recording buffers and timestamp continuity

use serde::{Deserialize, Serialize};

use crate::capture::{CaptureEvent, MediaChunk};

/// Everything captured for one recording so far: segments recorded before
/// the current context plus whatever the live capture adds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferedTimeline {
    pub events: Vec<CaptureEvent>,
    pub media_chunks: Vec<MediaChunk>,
}

impl BufferedTimeline {
    pub fn new(events: Vec<CaptureEvent>, media_chunks: Vec<MediaChunk>) -> Self {
        Self {
            events,
            media_chunks,
        }
    }

    /// Append a newer segment after everything already here. Segments are
    /// joined in arrival order and never re-sorted, so the stored order is
    /// the recorded order even if clocks skewed between segments.
    pub fn extend(&mut self, events: Vec<CaptureEvent>, media_chunks: Vec<MediaChunk>) {
        self.events.extend(events);
        self.media_chunks.extend(media_chunks);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.media_chunks.is_empty()
    }
}

/// Rebase every event by `delta` milliseconds. Order and the gaps between
/// events are untouched; only the absolute anchor moves.
pub fn shift_events(events: &mut [CaptureEvent], delta: i64) {
    if delta == 0 {
        return;
    }
    for event in events {
        event.timestamp += delta;
    }
}
