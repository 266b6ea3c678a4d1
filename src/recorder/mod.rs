//! Recording coordination: state, orchestration, context wiring

pub mod context;
pub mod mirror;
pub mod orchestrator;
pub mod state;
pub mod state_store;
pub mod timeline;

pub use context::{FrameContext, PageContext};
pub use mirror::FrameMirror;
pub use orchestrator::{OrchestratorHandle, PageOrchestrator};
pub use state::{RecordPhase, RecorderState, RecorderStatus, TransitionError};
pub use state_store::StateStore;
pub use timeline::{shift_events, BufferedTimeline};

/// Channel service names the page orchestrator provides.
pub mod service {
    pub const START_RECORD: &str = "StartRecord";
    pub const RESUME_RECORD: &str = "ResumeRecord";
    pub const PAUSE_RECORD: &str = "PauseRecord";
    pub const STOP_RECORD: &str = "StopRecord";

    /// Event emitted after a session is saved or deleted.
    pub const SESSION_UPDATED: &str = "SessionUpdated";
}
