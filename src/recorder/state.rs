//! Recorder state shared across contexts and the transition guard

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ContextId;

/// Where the recorder is, as every surface sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecorderStatus {
    Idle,
    Recording,
    Paused,
    /// Paused with the intent to continue in a different context.
    PausedSwitching,
}

impl RecorderStatus {
    pub fn is_paused(&self) -> bool {
        matches!(self, RecorderStatus::Paused | RecorderStatus::PausedSwitching)
    }
}

impl std::fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecorderStatus::Idle => "IDLE",
            RecorderStatus::Recording => "RECORDING",
            RecorderStatus::Paused => "PAUSED",
            RecorderStatus::PausedSwitching => "PAUSED_SWITCHING",
        };
        f.write_str(name)
    }
}

/// Snapshot of the recorder, persisted on every transition so a reload or
/// restart can pick up where the last context left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderState {
    pub status: RecorderStatus,
    /// Context that owns the active recording, if any.
    pub active_context: Option<ContextId>,
    /// Clock anchor of the current recording segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    /// When the recording was last paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_timestamp: Option<i64>,
}

impl RecorderState {
    pub fn idle() -> Self {
        Self {
            status: RecorderStatus::Idle,
            active_context: None,
            start_timestamp: None,
            paused_timestamp: None,
        }
    }

    pub fn recording(context: ContextId, start_timestamp: i64) -> Self {
        Self {
            status: RecorderStatus::Recording,
            active_context: Some(context),
            start_timestamp: Some(start_timestamp),
            paused_timestamp: None,
        }
    }
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Where the orchestrator is between a request and the capture agent's
/// answer. Guards every operation so overlapping requests cannot race the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPhase {
    Idle,
    /// A start or resume was accepted; waiting for the engine to go live.
    Acquiring,
    Recording,
    /// A stop was accepted; waiting for the final buffers.
    Stopping,
    /// A pause was accepted; waiting for the final buffers.
    Pausing,
    Paused,
}

impl std::fmt::Display for RecordPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordPhase::Idle => "idle",
            RecordPhase::Acquiring => "acquiring",
            RecordPhase::Recording => "recording",
            RecordPhase::Stopping => "stopping",
            RecordPhase::Pausing => "pausing",
            RecordPhase::Paused => "paused",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {op} while {phase}")]
pub struct TransitionError {
    op: &'static str,
    phase: RecordPhase,
}

impl RecordPhase {
    /// Begin a fresh recording. Only valid from a cold idle state.
    pub fn start(self) -> Result<RecordPhase, TransitionError> {
        match self {
            RecordPhase::Idle => Ok(RecordPhase::Acquiring),
            phase => Err(TransitionError { op: "start", phase }),
        }
    }

    /// Continue a recording from restored buffers. Valid from paused, and
    /// from idle so a different context can pick a paused recording up.
    pub fn resume(self) -> Result<RecordPhase, TransitionError> {
        match self {
            RecordPhase::Idle | RecordPhase::Paused => Ok(RecordPhase::Acquiring),
            phase => Err(TransitionError {
                op: "resume",
                phase,
            }),
        }
    }

    pub fn stop(self) -> Result<RecordPhase, TransitionError> {
        match self {
            RecordPhase::Recording => Ok(RecordPhase::Stopping),
            phase => Err(TransitionError { op: "stop", phase }),
        }
    }

    pub fn pause(self) -> Result<RecordPhase, TransitionError> {
        match self {
            RecordPhase::Recording => Ok(RecordPhase::Pausing),
            phase => Err(TransitionError { op: "pause", phase }),
        }
    }

    /// Applied when the capture agent confirms it armed.
    pub fn capture_started(self) -> RecordPhase {
        match self {
            RecordPhase::Acquiring => RecordPhase::Recording,
            other => other,
        }
    }

    /// Applied when the capture agent hands its buffers back.
    pub fn capture_stopped(self) -> RecordPhase {
        match self {
            RecordPhase::Stopping => RecordPhase::Idle,
            RecordPhase::Pausing => RecordPhase::Paused,
            other => other,
        }
    }
}
