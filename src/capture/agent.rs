//! Capture agent: the single owner of the engine inside one page context
//!
//! The agent listens on the page bus for control messages, arms the engine
//! on `StartRecord`, buffers and forwards everything the engine produces,
//! and hands the authoritative buffers back in exactly one `RecordStopped`
//! per arm cycle. All other traffic is ignored while disarmed.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::engine::{
    CaptureConfig, CaptureEngine, CaptureEvent, CaptureSink, EngineHandle, MediaChunk,
};
use super::messages::{PageBus, PageMessage};
use crate::util::Clock;

pub struct CaptureAgent {
    engine: Arc<dyn CaptureEngine>,
    bus: PageBus,
    clock: Arc<dyn Clock>,
    // Armed exactly while this is Some.
    run: Option<EngineHandle>,
    events_rx: Option<mpsc::UnboundedReceiver<CaptureEvent>>,
    media_rx: Option<mpsc::UnboundedReceiver<MediaChunk>>,
    events: Vec<CaptureEvent>,
    media_chunks: Vec<MediaChunk>,
}

impl CaptureAgent {
    /// Spawn the agent loop for one page context. `RecordScriptReady` is
    /// posted once the bus subscription exists, so a peer that sees it can
    /// safely send `StartRecord` without racing the subscription.
    pub fn spawn(
        engine: Arc<dyn CaptureEngine>,
        bus: PageBus,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        // Subscribe before the task is spawned so no control message can
        // slip between readiness and the first recv.
        let control = bus.subscribe();
        let agent = CaptureAgent {
            engine,
            bus,
            clock,
            run: None,
            events_rx: None,
            media_rx: None,
            events: Vec::new(),
            media_chunks: Vec::new(),
        };
        tokio::spawn(agent.run_loop(control, cancel))
    }

    async fn run_loop(
        mut self,
        mut control: tokio::sync::broadcast::Receiver<PageMessage>,
        cancel: CancellationToken,
    ) {
        self.bus.post(PageMessage::RecordScriptReady);
        debug!("capture agent ready");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = control.recv() => match message {
                    Ok(PageMessage::StartRecord { config }) => self.handle_start(config).await,
                    Ok(PageMessage::StopRecord) => self.handle_stop().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "capture agent lagged behind the page bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                maybe_event = next_item(&mut self.events_rx) => match maybe_event {
                    Some(event) => self.absorb_event(event),
                    None => self.events_rx = None,
                },
                maybe_chunk = next_item(&mut self.media_rx) => match maybe_chunk {
                    Some(chunk) => self.absorb_chunk(chunk),
                    None => self.media_rx = None,
                },
            }
        }
        debug!("capture agent shut down");
    }

    async fn handle_start(&mut self, config: CaptureConfig) {
        if self.run.is_some() {
            debug!("start ignored, capture already armed");
            return;
        }

        // Arming resets the buffers; nothing else ever clears them.
        self.events.clear();
        self.media_chunks.clear();

        let (sink, stream) = CaptureSink::pair();
        // Awaiting here queues any bus traffic that arrives during
        // acquisition; a stop sent in the meantime applies right after
        // the start completes.
        match self.engine.start(config, sink).await {
            Ok(handle) => {
                self.run = Some(handle);
                self.events_rx = Some(stream.events);
                self.media_rx = Some(stream.media);
                let start_timestamp = self.clock.now_ms();
                debug!(start_timestamp, "capture armed");
                self.bus
                    .post(PageMessage::RecordStarted { start_timestamp });
            }
            Err(e) => {
                warn!(error = %e, "capture acquisition failed");
                self.bus.post(PageMessage::RecordFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    async fn handle_stop(&mut self) {
        let Some(handle) = self.run.take() else {
            debug!("stop ignored, capture not armed");
            return;
        };

        // Engine stop resolves only after the device flushed its final
        // chunk into the sink.
        if let Err(e) = self.engine.stop(handle).await {
            warn!(error = %e, "capture engine stop reported an error");
        }

        // Drain whatever landed during teardown so the final chunk is part
        // of the handover.
        if let Some(mut rx) = self.events_rx.take() {
            while let Ok(event) = rx.try_recv() {
                self.absorb_event(event);
            }
        }
        if let Some(mut rx) = self.media_rx.take() {
            while let Ok(chunk) = rx.try_recv() {
                self.absorb_chunk(chunk);
            }
        }

        let end_timestamp = self.clock.now_ms();
        debug!(
            end_timestamp,
            events = self.events.len(),
            media_chunks = self.media_chunks.len(),
            "capture disarmed"
        );
        self.bus.post(PageMessage::RecordStopped {
            events: std::mem::take(&mut self.events),
            media_chunks: std::mem::take(&mut self.media_chunks),
            end_timestamp,
        });
    }

    fn absorb_event(&mut self, event: CaptureEvent) {
        self.events.push(event.clone());
        self.bus.post(PageMessage::EmitEvent { event });
    }

    fn absorb_chunk(&mut self, chunk: MediaChunk) {
        self.media_chunks.push(chunk.clone());
        self.bus.post(PageMessage::EmitMediaChunk { chunk });
    }
}

/// Await the next item from an optional receiver, pending forever once the
/// receiver is gone so a closed stream cannot spin the select loop.
async fn next_item<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
