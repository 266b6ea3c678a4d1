pub mod capture;
pub mod channel;
pub mod config;
pub mod control;
pub mod recorder;
pub mod session;
pub mod store;
pub mod util;

pub use capture::{CaptureConfig, CaptureEngine, CaptureEvent, MediaChunk, ScriptedEngine};
pub use channel::{Channel, ChannelError, ContextId, MessageHub, RequestTarget};
pub use config::Config;
pub use control::{ControlError, ControlSurface};
pub use recorder::{FrameContext, PageContext, RecorderState, RecorderStatus, StateStore};
pub use session::{Session, SessionLibrary};
pub use store::{Database, KeyValueStore, MemoryStore, SqliteStore, StoreError};
pub use util::{Clock, ManualClock, SystemClock};
