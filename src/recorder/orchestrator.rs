//! Page orchestrator: drives the capture agent inside the top page
//!
//! The orchestrator provides the recording services other contexts call
//! over the channel, guards them with [`RecordPhase`], and owns the
//! buffers for the recording in progress. It is the only writer of the
//! shared [`StateStore`], so every surface observes transitions from one
//! place.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::service;
use super::state::{RecordPhase, RecorderState, RecorderStatus};
use super::state_store::StateStore;
use super::timeline::{shift_events, BufferedTimeline};
use crate::capture::{CaptureConfig, CaptureEvent, MediaChunk, PageBus, PageMessage};
use crate::channel::{Channel, ContextId};
use crate::session::{SessionDraft, RECORDER_VERSION};
use crate::util::Clock;

type Reply = oneshot::Sender<Result<Value, String>>;

enum Command {
    Start {
        reply: Reply,
    },
    Resume {
        events: Vec<CaptureEvent>,
        media_chunks: Vec<MediaChunk>,
        paused_timestamp: Option<i64>,
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    Pause {
        status: RecorderStatus,
        reply: Reply,
    },
    Flush {
        reply: oneshot::Sender<bool>,
    },
}

#[derive(Deserialize)]
struct ResumeParams {
    #[serde(default)]
    events: Vec<CaptureEvent>,
    #[serde(default)]
    media_chunks: Vec<MediaChunk>,
    #[serde(default)]
    paused_timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct PauseParams {
    #[serde(default)]
    status: Option<RecorderStatus>,
}

pub struct PageOrchestrator;

impl PageOrchestrator {
    /// Register the recording services on `channel` and spawn the actor.
    /// The bus subscription is taken before this returns, so the capture
    /// agent can be spawned right after without a handshake race.
    pub fn spawn(
        channel: &Channel,
        bus: &PageBus,
        state: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        capture_config: CaptureConfig,
        title: impl Into<String>,
        cancel: CancellationToken,
    ) -> OrchestratorHandle {
        let (commands, cmd_rx) = mpsc::unbounded_channel();

        let tx = commands.clone();
        channel.provide(service::START_RECORD, move |_params| {
            let tx = tx.clone();
            async move { dispatch(tx, |reply| Command::Start { reply }).await }
        });

        let tx = commands.clone();
        channel.provide(service::RESUME_RECORD, move |params| {
            let tx = tx.clone();
            async move {
                let params: ResumeParams = serde_json::from_value(params)
                    .map_err(|e| format!("invalid resume parameters: {e}"))?;
                dispatch(tx, |reply| Command::Resume {
                    events: params.events,
                    media_chunks: params.media_chunks,
                    paused_timestamp: params.paused_timestamp,
                    reply,
                })
                .await
            }
        });

        let tx = commands.clone();
        channel.provide(service::PAUSE_RECORD, move |params| {
            let tx = tx.clone();
            async move {
                let params: PauseParams = serde_json::from_value(params)
                    .map_err(|e| format!("invalid pause parameters: {e}"))?;
                let status = params.status.unwrap_or(RecorderStatus::Paused);
                if !status.is_paused() {
                    return Err(format!("cannot pause into {status}"));
                }
                dispatch(tx, |reply| Command::Pause { status, reply }).await
            }
        });

        let tx = commands.clone();
        channel.provide(service::STOP_RECORD, move |_params| {
            let tx = tx.clone();
            async move { dispatch(tx, |reply| Command::Stop { reply }).await }
        });

        let bus_rx = bus.subscribe();
        let orchestrator = Orchestrator {
            context: channel.context_id(),
            bus: bus.clone(),
            state,
            clock,
            capture_config,
            title: title.into(),
            phase: RecordPhase::Idle,
            prior: BufferedTimeline::default(),
            live: BufferedTimeline::default(),
            agent_ready: false,
            pending_arm: false,
            pending_start: None,
            pending_stop: None,
        };
        let task = tokio::spawn(orchestrator.run(bus_rx, cmd_rx, cancel));
        OrchestratorHandle { commands, task }
    }
}

async fn dispatch(
    tx: mpsc::UnboundedSender<Command>,
    make: impl FnOnce(Reply) -> Command,
) -> Result<Value, String> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(make(reply_tx))
        .map_err(|_| "recorder is shutting down".to_string())?;
    reply_rx
        .await
        .map_err(|_| "recorder is shutting down".to_string())?
}

/// Handle to a running orchestrator, held by the owning context.
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Flush unsaved capture the way an unload prompt would. Returns true
    /// when there was unsaved data, in which case the teardown deserves a
    /// challenge.
    pub async fn flush_before_unload(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush { reply: tx }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

enum PendingStart {
    Fresh {
        reply: Reply,
    },
    Resume {
        reply: Reply,
        rollback: RecordPhase,
        paused_timestamp: Option<i64>,
        restored: BufferedTimeline,
    },
    /// Re-arming after a reload interrupted an active recording.
    Recovery,
}

enum PendingStop {
    Stop { reply: Reply },
    Pause { reply: Reply, status: RecorderStatus },
}

struct Orchestrator {
    context: ContextId,
    bus: PageBus,
    state: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    capture_config: CaptureConfig,
    title: String,
    phase: RecordPhase,
    /// Segments recorded before the current arm cycle, already rebased.
    prior: BufferedTimeline,
    /// Best-effort accumulation of forwarded output, used only by the
    /// unload flush. The agent's handover remains authoritative.
    live: BufferedTimeline,
    agent_ready: bool,
    pending_arm: bool,
    pending_start: Option<PendingStart>,
    pending_stop: Option<PendingStop>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut bus_rx: broadcast::Receiver<PageMessage>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        self.recover_if_interrupted().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut bus_rx).await,
                    // Every handle is gone; the context is tearing down.
                    None => break,
                },
                message = bus_rx.recv() => match message {
                    Ok(message) => self.handle_page_message(message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "orchestrator lagged behind the page bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!(context = %self.context, "page orchestrator shut down");
    }

    /// A recording that was live when its context died stays live: splice
    /// the flushed buffers back in and re-arm in this context. The
    /// original start timestamp is kept, which keeps the timeline
    /// continuous without any rebasing.
    async fn recover_if_interrupted(&mut self) {
        let state = self.state.state();
        if state.status != RecorderStatus::Recording {
            return;
        }
        match self.state.read_buffered().await {
            Ok(buffered) => self.prior = buffered,
            Err(e) => {
                error!(error = %e, "failed to restore flushed buffers, continuing without them");
                self.prior = BufferedTimeline::default();
            }
        }
        info!(
            context = %self.context,
            events = self.prior.events.len(),
            start_timestamp = ?state.start_timestamp,
            "resuming recording interrupted by a reload"
        );
        self.phase = RecordPhase::Acquiring;
        self.pending_start = Some(PendingStart::Recovery);
        self.request_arm();
    }

    fn request_arm(&mut self) {
        if self.agent_ready {
            self.bus.post(PageMessage::StartRecord {
                config: self.capture_config.clone(),
            });
        } else {
            // Posted as soon as the agent announces readiness.
            self.pending_arm = true;
        }
    }

    async fn handle_command(
        &mut self,
        command: Command,
        bus_rx: &mut broadcast::Receiver<PageMessage>,
    ) {
        match command {
            Command::Start { reply } => match self.phase.start() {
                Ok(next) => {
                    self.phase = next;
                    self.prior = BufferedTimeline::default();
                    self.live = BufferedTimeline::default();
                    self.pending_start = Some(PendingStart::Fresh { reply });
                    self.request_arm();
                }
                Err(e) => {
                    let _ = reply.send(Err(e.to_string()));
                }
            },
            Command::Resume {
                events,
                media_chunks,
                paused_timestamp,
                reply,
            } => {
                let rollback = self.phase;
                match self.phase.resume() {
                    Ok(next) => {
                        self.phase = next;
                        self.live = BufferedTimeline::default();
                        self.pending_start = Some(PendingStart::Resume {
                            reply,
                            rollback,
                            paused_timestamp,
                            restored: BufferedTimeline::new(events, media_chunks),
                        });
                        self.request_arm();
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
            Command::Stop { reply } => match self.phase.stop() {
                Ok(next) => {
                    self.phase = next;
                    self.pending_stop = Some(PendingStop::Stop { reply });
                    self.bus.post(PageMessage::StopRecord);
                }
                Err(e) => {
                    let _ = reply.send(Err(e.to_string()));
                }
            },
            Command::Pause { status, reply } => match self.phase.pause() {
                Ok(next) => {
                    self.phase = next;
                    self.pending_stop = Some(PendingStop::Pause { reply, status });
                    self.bus.post(PageMessage::StopRecord);
                }
                Err(e) => {
                    let _ = reply.send(Err(e.to_string()));
                }
            },
            Command::Flush { reply } => {
                // Forwards already posted to the bus count as unsaved;
                // pull everything ready before deciding.
                self.drain_ready(bus_rx).await;
                let vetoed = self.flush_unsaved().await;
                let _ = reply.send(vetoed);
            }
        }
    }

    /// Absorb every bus message that has already arrived, without waiting
    /// for more.
    async fn drain_ready(&mut self, bus_rx: &mut broadcast::Receiver<PageMessage>) {
        loop {
            match bus_rx.try_recv() {
                Ok(message) => self.handle_page_message(message).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "orchestrator lagged behind the page bus");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    async fn handle_page_message(&mut self, message: PageMessage) {
        tracing::trace!(message = message.name(), phase = %self.phase, "page message");
        match message {
            PageMessage::RecordScriptReady => {
                self.agent_ready = true;
                if std::mem::take(&mut self.pending_arm) {
                    self.bus.post(PageMessage::StartRecord {
                        config: self.capture_config.clone(),
                    });
                }
            }
            PageMessage::RecordStarted { start_timestamp } => {
                self.handle_record_started(start_timestamp).await;
            }
            PageMessage::RecordStopped {
                events,
                media_chunks,
                end_timestamp,
            } => {
                self.handle_record_stopped(events, media_chunks, end_timestamp)
                    .await;
            }
            PageMessage::RecordFailed { message } => {
                self.handle_record_failed(message).await;
            }
            PageMessage::EmitEvent { event } => {
                if self.capturing() {
                    self.live.events.push(event);
                }
            }
            PageMessage::EmitMediaChunk { chunk } => {
                if self.capturing() {
                    self.live.media_chunks.push(chunk);
                }
            }
            // Echoes of our own control posts.
            PageMessage::StartRecord { .. } | PageMessage::StopRecord => {}
        }
    }

    fn capturing(&self) -> bool {
        matches!(
            self.phase,
            RecordPhase::Recording | RecordPhase::Stopping | RecordPhase::Pausing
        )
    }

    async fn handle_record_started(&mut self, start_timestamp: i64) {
        self.phase = self.phase.capture_started();
        match self.pending_start.take() {
            Some(PendingStart::Fresh { reply }) => {
                self.write_state(RecorderState::recording(self.context, start_timestamp))
                    .await;
                info!(start_timestamp, "recording started");
                let _ = reply.send(Ok(json!({ "start_timestamp": start_timestamp })));
            }
            Some(PendingStart::Resume {
                reply,
                paused_timestamp,
                mut restored,
                ..
            }) => {
                // A pause whose persistence failed left the only copy of
                // the recording here; empty resume arguments fall back to
                // it.
                if restored.is_empty() && !self.prior.is_empty() {
                    restored = std::mem::take(&mut self.prior);
                }
                // Rebase the restored segment so its tail meets the new
                // anchor; the pause gap disappears from the timeline.
                let delta = paused_timestamp
                    .map(|paused| start_timestamp - paused)
                    .unwrap_or(0);
                shift_events(&mut restored.events, delta);
                debug!(
                    delta,
                    restored = restored.events.len(),
                    "restored buffers rebased"
                );
                self.prior = restored;
                self.write_state(RecorderState::recording(self.context, start_timestamp))
                    .await;
                info!(start_timestamp, "recording resumed");
                let _ = reply.send(Ok(json!({ "start_timestamp": start_timestamp })));
            }
            Some(PendingStart::Recovery) => {
                // The original anchor survives; only the owning context
                // moves.
                let mut state = self.state.state();
                state.active_context = Some(self.context);
                self.write_state(state).await;
                info!("recording recovered after reload");
            }
            None => warn!("capture started without a pending request"),
        }
    }

    async fn handle_record_failed(&mut self, message: String) {
        match self.pending_start.take() {
            Some(PendingStart::Fresh { reply }) => {
                self.phase = RecordPhase::Idle;
                let _ = reply.send(Err(message));
            }
            Some(PendingStart::Resume { reply, rollback, .. }) => {
                self.phase = rollback;
                let _ = reply.send(Err(message));
            }
            Some(PendingStart::Recovery) => {
                // Cannot re-acquire after the reload. Park the recording
                // as paused; the flushed buffers are still persisted, so a
                // manual resume can continue it.
                error!(
                    error = %message,
                    "re-acquisition failed after reload, pausing the recording"
                );
                self.phase = RecordPhase::Paused;
                let mut state = self.state.state();
                state.status = RecorderStatus::Paused;
                state.paused_timestamp = Some(self.clock.now_ms());
                self.write_state(state).await;
                self.prior = BufferedTimeline::default();
            }
            None => warn!(error = %message, "capture failure without a pending request"),
        }
    }

    async fn handle_record_stopped(
        &mut self,
        events: Vec<CaptureEvent>,
        media_chunks: Vec<MediaChunk>,
        end_timestamp: i64,
    ) {
        self.phase = self.phase.capture_stopped();
        self.live = BufferedTimeline::default();
        match self.pending_stop.take() {
            Some(PendingStop::Stop { reply }) => {
                let mut full = std::mem::take(&mut self.prior);
                full.extend(events, media_chunks);
                self.write_state(RecorderState::idle()).await;
                if let Err(e) = self.state.clear_buffered().await {
                    warn!(error = %e, "failed to clear flushed buffers");
                }
                info!(
                    events = full.events.len(),
                    media_chunks = full.media_chunks.len(),
                    "recording stopped"
                );
                // Identity and timestamps stay unassigned; the assembler
                // on the receiving side mints them.
                let draft = SessionDraft {
                    name: self.title.clone(),
                    recorder_version: Some(RECORDER_VERSION.to_string()),
                    ..SessionDraft::default()
                };
                let _ = reply.send(Ok(json!({
                    "session": draft,
                    "events": full.events,
                    "media_chunks": full.media_chunks,
                })));
            }
            Some(PendingStop::Pause { reply, status }) => {
                let mut full = std::mem::take(&mut self.prior);
                full.extend(events, media_chunks);
                let persisted = self.state.write_buffered(&full).await;
                let mut state = self.state.state();
                state.status = status;
                state.active_context = Some(self.context);
                state.paused_timestamp = Some(end_timestamp);
                self.write_state(state).await;
                match persisted {
                    Ok(()) => {
                        info!(
                            status = %status,
                            events = full.events.len(),
                            paused_timestamp = end_timestamp,
                            "recording paused"
                        );
                        let _ = reply.send(Ok(json!({
                            "events": full.events,
                            "media_chunks": full.media_chunks,
                            "status": status,
                        })));
                    }
                    Err(e) => {
                        error!(error = %e, "failed to persist paused recording");
                        // This is now the only copy; keep it for a resume.
                        self.prior = full;
                        let _ =
                            reply.send(Err(format!("failed to persist paused recording: {e}")));
                    }
                }
            }
            None => warn!("capture stopped without a pending request"),
        }
    }

    /// Persist everything captured so far ahead of a context teardown.
    /// Returns true when unsaved data existed; a false return means the
    /// teardown can proceed silently.
    async fn flush_unsaved(&mut self) -> bool {
        if self.live.is_empty() {
            return false;
        }
        let mut combined = self.prior.clone();
        combined.extend(self.live.events.clone(), self.live.media_chunks.clone());
        match self.state.write_buffered(&combined).await {
            Ok(()) => {
                debug!(
                    events = combined.events.len(),
                    media_chunks = combined.media_chunks.len(),
                    "unsaved capture flushed"
                );
            }
            Err(e) => error!(error = %e, "failed to flush unsaved capture"),
        }
        true
    }

    async fn write_state(&self, state: RecorderState) {
        if let Err(e) = self.state.write(state).await {
            error!(error = %e, "failed to persist recorder state");
        }
    }
}
