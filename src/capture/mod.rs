//! Screen and event capture: engine interface, page bus, capture agent

pub mod agent;
pub mod engine;
pub mod messages;
pub mod scripted;

pub use agent::CaptureAgent;
pub use engine::{
    CaptureConfig, CaptureEngine, CaptureError, CaptureEvent, CaptureSink, CaptureStream,
    EngineHandle, MediaChunk,
};
pub use messages::{PageBus, PageMessage};
pub use scripted::{ScriptedConfig, ScriptedEngine};
