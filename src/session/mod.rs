//! Recorded sessions: metadata, library, assembly, archives

pub mod assembler;
pub mod export;
pub mod library;

pub use assembler::{SessionAssembler, RECORDER_VERSION};
pub use export::{ArchiveError, SessionArchive};
pub use library::SessionLibrary;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for one saved recording. The payload (events and media) is
/// stored separately under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub create_timestamp: i64,
    pub modify_timestamp: i64,
    /// Version of the recorder that produced the session.
    pub recorder_version: String,
}

/// A finished recording before identity is assigned. Fields left empty
/// are filled in by the assembler; fields carried over (from an import,
/// for example) are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub create_timestamp: Option<i64>,
    #[serde(default)]
    pub modify_timestamp: Option<i64>,
    #[serde(default)]
    pub recorder_version: Option<String>,
}

impl SessionDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
