//! Frame mirror: replicates top-page recording state into a frame
//!
//! Cross-origin frames cannot see the top page directly. The mirror
//! follows the shared recorder state and keeps the frame's capture agent
//! armed exactly while a recording is live. It is a pure follower: it
//! posts control messages on the frame's own bus and never emits anything
//! outward.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::state::{RecorderState, RecorderStatus};
use crate::capture::{CaptureConfig, PageBus, PageMessage};

pub struct FrameMirror;

impl FrameMirror {
    /// Spawn the mirror loop for one frame context. Subscribes to the
    /// frame bus before returning so the agent's readiness announcement
    /// cannot be missed.
    pub fn spawn(
        bus: PageBus,
        state_rx: watch::Receiver<RecorderState>,
        capture_config: CaptureConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let control = bus.subscribe();
        tokio::spawn(run(bus, control, state_rx, capture_config, cancel))
    }
}

async fn run(
    bus: PageBus,
    mut control: tokio::sync::broadcast::Receiver<PageMessage>,
    mut state_rx: watch::Receiver<RecorderState>,
    capture_config: CaptureConfig,
    cancel: CancellationToken,
) {
    let mut agent_ready = false;
    let mut armed = false;
    // A frame created mid-recording must arm immediately.
    let mut desired = state_rx.borrow().status == RecorderStatus::Recording;

    loop {
        if desired && !armed && agent_ready {
            debug!("arming frame capture");
            bus.post(PageMessage::StartRecord {
                config: capture_config.clone(),
            });
            armed = true;
        }
        if !desired && armed {
            debug!("disarming frame capture");
            bus.post(PageMessage::StopRecord);
            armed = false;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                desired =
                    state_rx.borrow_and_update().status == RecorderStatus::Recording;
            }
            message = control.recv() => match message {
                Ok(PageMessage::RecordScriptReady) => agent_ready = true,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "frame mirror lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("frame mirror shut down");
}
