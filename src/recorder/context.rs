//! Execution context wiring
//!
//! A [`PageContext`] assembles everything that lives inside one top page:
//! bus, capture agent, orchestrator, and the channel endpoint carrying its
//! services. A [`FrameContext`] is the reduced wiring for a cross-origin
//! frame: agent plus mirror, no channel services. Creation order matters
//! in both: subscribers first, then the agent, so the readiness handshake
//! cannot be missed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::mirror::FrameMirror;
use super::orchestrator::{OrchestratorHandle, PageOrchestrator};
use super::state_store::StateStore;
use crate::capture::{CaptureAgent, CaptureConfig, CaptureEngine, PageBus};
use crate::channel::{Channel, ContextId, MessageHub};
use crate::util::Clock;

pub struct PageContext {
    pub context: ContextId,
    channel: Channel,
    orchestrator: OrchestratorHandle,
    cancel: CancellationToken,
}

impl PageContext {
    /// Bring up a top page. The page immediately announces recording
    /// services on the hub and recovers an interrupted recording if the
    /// shared state says one was live.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        hub: &Arc<MessageHub>,
        engine: Arc<dyn CaptureEngine>,
        state: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        capture_config: CaptureConfig,
        title: impl Into<String>,
        channel_timeout: std::time::Duration,
    ) -> PageContext {
        let context = hub.allocate_context();
        let channel =
            Channel::new(Arc::new(hub.attach(context))).with_timeout(channel_timeout);
        let bus = PageBus::new();
        let cancel = CancellationToken::new();

        // Orchestrator before agent: the bus subscription must exist when
        // RecordScriptReady goes out.
        let orchestrator = PageOrchestrator::spawn(
            &channel,
            &bus,
            state,
            clock.clone(),
            capture_config,
            title,
            cancel.clone(),
        );
        CaptureAgent::spawn(engine, bus, clock, cancel.clone());

        debug!(context = %context, "page context opened");
        PageContext {
            context,
            channel,
            orchestrator,
            cancel,
        }
    }

    /// The page's own channel endpoint.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Flush unsaved capture the way a beforeunload prompt does. Returns
    /// true when unsaved data was persisted, in which case the caller may
    /// challenge the navigation. A cancelled navigation leaves the page
    /// running, so this can fire any number of times.
    pub async fn flush(&self) -> bool {
        self.orchestrator.flush_before_unload().await
    }

    /// Tear the page down the way navigation does: give the orchestrator
    /// its unload flush, then stop every task. Returns true when unsaved
    /// capture was flushed for a successor context to pick up.
    pub async fn unload(self) -> bool {
        let vetoed = self.flush().await;
        self.cancel.cancel();
        self.orchestrator.abort();
        debug!(context = %self.context, vetoed, "page context unloaded");
        vetoed
    }
}

pub struct FrameContext {
    pub context: ContextId,
    cancel: CancellationToken,
}

impl FrameContext {
    /// Bring up a cross-origin frame inside a page. Frames have no channel
    /// endpoint; they follow the shared recorder state through the mirror.
    pub fn open(
        hub: &Arc<MessageHub>,
        engine: Arc<dyn CaptureEngine>,
        state: &StateStore,
        clock: Arc<dyn Clock>,
        capture_config: CaptureConfig,
    ) -> FrameContext {
        let context = hub.allocate_context();
        let bus = PageBus::new();
        let cancel = CancellationToken::new();

        // Mirror before agent, same handshake rule as the page wiring.
        FrameMirror::spawn(
            bus.clone(),
            state.subscribe(),
            capture_config,
            cancel.clone(),
        );
        CaptureAgent::spawn(engine, bus, clock, cancel.clone());

        debug!(context = %context, "frame context opened");
        FrameContext { context, cancel }
    }

    pub fn close(self) {
        self.cancel.cancel();
        debug!(context = %self.context, "frame context closed");
    }
}
