//! Control surface: the user-facing recorder API
//!
//! Runs in its own context (a popup or side panel in the original
//! deployment) and owns no capture machinery. User intents become
//! channel requests against the page that holds the recording, and a
//! finished handover is assembled and stored here. A save that fails is
//! parked so the user can retry it without losing the recording.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::capture::{CaptureEvent, MediaChunk};
use crate::channel::{Channel, ChannelError, ContextId, MessageHub, RequestTarget};
use crate::recorder::{service, RecorderState, RecorderStatus, StateStore};
use crate::session::{Session, SessionAssembler, SessionDraft, SessionLibrary};
use crate::store::StoreError;
use crate::util::Clock;

/// Name given to a recording when neither the user nor the page supplied
/// one.
pub const UNTITLED_SESSION: &str = "Untitled recording";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no page provides recording here")]
    RecorderUnavailable,
    #[error("no recording in progress")]
    NotRecording,
    #[error("no paused recording to resume")]
    NotPaused,
    #[error("no failed save to retry")]
    NoPendingSave,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("malformed recorder reply: {0}")]
    MalformedReply(#[from] serde_json::Error),
}

/// The handover a page returns from a stop request. The draft carries
/// the page's title as its name; identity is still unassigned.
#[derive(Deserialize)]
struct StopReply {
    #[serde(default)]
    session: SessionDraft,
    #[serde(default)]
    events: Vec<CaptureEvent>,
    #[serde(default)]
    media_chunks: Vec<MediaChunk>,
}

/// A save that failed after the capture machinery already handed the
/// recording over. Holding it keeps the data alive for a retry.
struct PendingSave {
    session: Session,
    events: Vec<CaptureEvent>,
    media_chunks: Vec<MediaChunk>,
}

pub struct ControlSurface {
    pub context: ContextId,
    channel: Channel,
    state: Arc<StateStore>,
    library: SessionLibrary,
    assembler: SessionAssembler,
    clock: Arc<dyn Clock>,
    pending_save: Mutex<Option<PendingSave>>,
}

impl ControlSurface {
    /// Attach a control surface to the hub. Requests without an explicit
    /// target go to whichever page the hub reports as focused.
    pub fn open(
        hub: &Arc<MessageHub>,
        state: Arc<StateStore>,
        library: SessionLibrary,
        clock: Arc<dyn Clock>,
        channel_timeout: Duration,
    ) -> ControlSurface {
        let context = hub.allocate_context();
        let resolver_hub = hub.clone();
        let channel = Channel::new(Arc::new(hub.attach(context)))
            .with_timeout(channel_timeout)
            .with_focus_resolver(Arc::new(move || resolver_hub.focused()));
        let assembler = SessionAssembler::new(library.clone(), clock.clone());
        ControlSurface {
            context,
            channel,
            state,
            library,
            assembler,
            clock,
            pending_save: Mutex::new(None),
        }
    }

    /// Start recording the focused page.
    pub async fn start_recording(&self) -> Result<(), ControlError> {
        let reply = self
            .channel
            .request(RequestTarget::Focused, service::START_RECORD, json!({}))
            .await?;
        if reply.is_null() {
            // The context answered but nothing there provides recording;
            // the page script is not injected on this page.
            return Err(ControlError::RecorderUnavailable);
        }
        Ok(())
    }

    /// Stop the recording and store it as a session. The session is named
    /// from `name` when given, falling back to the recorded page's title.
    pub async fn stop_recording(&self, name: Option<String>) -> Result<Session, ControlError> {
        let state = self.state.state();
        if state.status != RecorderStatus::Recording {
            return Err(ControlError::NotRecording);
        }
        let target = state
            .active_context
            .ok_or(ControlError::RecorderUnavailable)?;
        let reply = self
            .channel
            .request(RequestTarget::Context(target), service::STOP_RECORD, json!({}))
            .await?;
        if reply.is_null() {
            return Err(ControlError::RecorderUnavailable);
        }
        let handover: StopReply = serde_json::from_value(reply)?;

        let mut draft = handover.session;
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            draft.name = name;
        }
        if draft.name.trim().is_empty() {
            draft.name = UNTITLED_SESSION.to_string();
        }
        let session = self.assembler.assemble(draft);
        match self
            .assembler
            .persist(&session, &handover.events, &handover.media_chunks)
            .await
        {
            Ok(()) => {
                info!(
                    session = %session.id,
                    events = handover.events.len(),
                    media_chunks = handover.media_chunks.len(),
                    "session saved"
                );
                self.announce(&session);
                Ok(session)
            }
            Err(e) => {
                error!(
                    error = %e,
                    session = %session.id,
                    "failed to save the session, parking it for retry"
                );
                *self.pending_save.lock() = Some(PendingSave {
                    session,
                    events: handover.events,
                    media_chunks: handover.media_chunks,
                });
                Err(e.into())
            }
        }
    }

    /// Retry the save that failed last. The recording is given up only
    /// once a retry succeeds.
    pub async fn retry_save(&self) -> Result<Session, ControlError> {
        let pending = self
            .pending_save
            .lock()
            .take()
            .ok_or(ControlError::NoPendingSave)?;
        match self
            .assembler
            .persist(&pending.session, &pending.events, &pending.media_chunks)
            .await
        {
            Ok(()) => {
                info!(session = %pending.session.id, "parked session saved");
                self.announce(&pending.session);
                Ok(pending.session)
            }
            Err(e) => {
                *self.pending_save.lock() = Some(pending);
                Err(e.into())
            }
        }
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending_save.lock().is_some()
    }

    /// Pause the recording in place.
    pub async fn pause_recording(&self) -> Result<(), ControlError> {
        self.pause_with(RecorderStatus::Paused).await
    }

    /// Pause ahead of a page switch. The wire status tells the next page's
    /// surfaces that a resume is expected to follow.
    pub async fn pause_for_switch(&self) -> Result<(), ControlError> {
        self.pause_with(RecorderStatus::PausedSwitching).await
    }

    async fn pause_with(&self, status: RecorderStatus) -> Result<(), ControlError> {
        let state = self.state.state();
        if state.status != RecorderStatus::Recording {
            return Err(ControlError::NotRecording);
        }
        let target = state
            .active_context
            .ok_or(ControlError::RecorderUnavailable)?;
        let reply = self
            .channel
            .request(
                RequestTarget::Context(target),
                service::PAUSE_RECORD,
                json!({ "status": status }),
            )
            .await?;
        if reply.is_null() {
            return Err(ControlError::RecorderUnavailable);
        }
        Ok(())
    }

    /// Resume a paused recording on the focused page, which need not be
    /// the page that paused it.
    pub async fn resume_recording(&self) -> Result<(), ControlError> {
        let state = self.state.state();
        if !state.status.is_paused() {
            return Err(ControlError::NotPaused);
        }
        let buffered = self.state.read_buffered().await?;
        let params = json!({
            "events": buffered.events,
            "media_chunks": buffered.media_chunks,
            "paused_timestamp": state.paused_timestamp,
        });
        let reply = self
            .channel
            .request(RequestTarget::Focused, service::RESUME_RECORD, params)
            .await?;
        if reply.is_null() {
            return Err(ControlError::RecorderUnavailable);
        }
        Ok(())
    }

    /// Milliseconds of recording elapsed, frozen while paused. None when
    /// nothing is recording.
    pub fn elapsed_ms(&self) -> Option<i64> {
        let state = self.state.state();
        let start = state.start_timestamp?;
        match state.status {
            RecorderStatus::Recording => Some(self.clock.now_ms() - start),
            RecorderStatus::Paused | RecorderStatus::PausedSwitching => {
                state.paused_timestamp.map(|paused| paused - start)
            }
            RecorderStatus::Idle => None,
        }
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.state.state()
    }

    /// Follow recorder state transitions, for surfaces that render them.
    pub fn subscribe_state(&self) -> watch::Receiver<RecorderState> {
        self.state.subscribe()
    }

    /// Listen for sessions saved by any control surface on the hub.
    pub fn on_session_updated<F>(&self, listener: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.channel.on(service::SESSION_UPDATED, listener);
    }

    pub fn library(&self) -> &SessionLibrary {
        &self.library
    }

    fn announce(&self, session: &Session) {
        match serde_json::to_value(session) {
            Ok(payload) => self.channel.emit(service::SESSION_UPDATED, payload),
            Err(e) => warn!(error = %e, "failed to encode session announcement"),
        }
    }
}

impl std::fmt::Debug for ControlSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSurface")
            .field("context", &self.context)
            .finish()
    }
}
