//! Session archives
//!
//! A session exports as one self-contained JSON file holding the
//! metadata, the event stream and the media chunks. Importing stores
//! the archive under a fresh id so it can never collide with a session
//! already in the library.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::capture::{CaptureEvent, MediaChunk};
use crate::session::{Session, SessionLibrary};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionArchive {
    pub session: Session,
    #[serde(default)]
    pub events: Vec<CaptureEvent>,
    #[serde(default)]
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("session {0} does not exist")]
    UnknownSession(Uuid),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archive: {0}")]
    Format(#[from] serde_json::Error),
}

impl SessionLibrary {
    /// Write a session with its full payload as pretty JSON under `dir`.
    /// Returns the path of the written file.
    pub async fn export_session(&self, id: Uuid, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let session = self
            .get_session(id)
            .await?
            .ok_or(ArchiveError::UnknownSession(id))?;
        let events = self.get_events(id).await?;
        let media_chunks = self.get_media_chunks(id).await?;

        let path = dir.join(format!("{}.json", archive_file_stem(&session)));
        let archive = SessionArchive {
            session,
            events,
            media_chunks,
        };
        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(&archive)?)?;
        Ok(path)
    }

    /// Load an archive file into the library as a new session. The
    /// recorded timestamps and payload are kept as archived.
    pub async fn import_session(&self, path: &Path) -> Result<Session, ArchiveError> {
        let raw = std::fs::read_to_string(path)?;
        let archive: SessionArchive = serde_json::from_str(&raw)?;

        let mut session = archive.session;
        session.id = Uuid::new_v4();
        self.save_session(&session, &archive.events, &archive.media_chunks)
            .await?;
        Ok(session)
    }
}

/// File stem for an exported session: the lowercased name with anything
/// outside ASCII alphanumerics collapsed to dashes, plus a short id
/// suffix so same-named sessions do not overwrite each other.
fn archive_file_stem(session: &Session) -> String {
    let mut stem = String::new();
    for c in session.name.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_matches('-');
    let id = session.id.to_string();
    let short_id = &id[..8];
    if stem.is_empty() {
        id.clone()
    } else {
        format!("{stem}-{short_id}")
    }
}
