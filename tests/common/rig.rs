//! Full-system test rig
//!
//! Wires the pieces the way a real deployment does: one message hub, one
//! shared state store over an in-memory backend, any number of page and
//! frame contexts with their own scripted engines, and a control surface
//! with the hub's focus as its request target.

use std::sync::Arc;
use std::time::Duration;

use reel::capture::{CaptureConfig, ScriptedEngine};
use reel::recorder::{FrameContext, PageContext, StateStore};
use reel::session::SessionLibrary;
use reel::{ControlSurface, ManualClock, MemoryStore, MessageHub};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SystemRig {
    pub hub: Arc<MessageHub>,
    pub store: Arc<MemoryStore>,
    pub state: Arc<StateStore>,
    pub clock: Arc<ManualClock>,
    pub control: ControlSurface,
}

impl SystemRig {
    pub async fn new(start_ms: i64) -> Self {
        Self::over(Arc::new(MemoryStore::new()), start_ms).await
    }

    /// Build the rig on an existing backend, as after a browser restart.
    pub async fn over(store: Arc<MemoryStore>, start_ms: i64) -> Self {
        let hub = MessageHub::new();
        let clock = ManualClock::new(start_ms);
        let state = StateStore::load(store.clone()).await.expect("state store");
        let library = SessionLibrary::new(store.clone());
        let control =
            ControlSurface::open(&hub, state.clone(), library, clock.clone(), TEST_TIMEOUT);
        Self {
            hub,
            store,
            state,
            clock,
            control,
        }
    }

    /// Open a top page with its own scripted engine and focus it.
    pub fn open_page(&self, title: &str) -> (PageContext, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine::new(self.clock.clone()));
        let page = PageContext::open(
            &self.hub,
            engine.clone(),
            self.state.clone(),
            self.clock.clone(),
            CaptureConfig::default(),
            title,
            TEST_TIMEOUT,
        );
        self.hub.set_focused(Some(page.context));
        (page, engine)
    }

    /// Open a cross-origin frame with its own scripted engine.
    pub fn open_frame(&self) -> (FrameContext, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine::new(self.clock.clone()));
        let frame = FrameContext::open(
            &self.hub,
            engine.clone(),
            &self.state,
            self.clock.clone(),
            CaptureConfig::default(),
        );
        (frame, engine)
    }
}

/// Poll until `predicate` holds, failing the test after [`TEST_TIMEOUT`].
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll `flush` until the page reports unsaved data was persisted. Capture
/// forwards travel asynchronously, so the first flush can race them.
pub async fn flush_until_dirty(page: &PageContext) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    loop {
        if page.flush().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "flush never saw unsaved capture"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
