//! Turning finished recordings into stored sessions
//!
//! Assembly and persistence are separate steps: `assemble` fixes the
//! identity and timestamps once, and `persist` can then be retried any
//! number of times against the same `Session` without minting a new id
//! on each attempt.

use std::sync::Arc;

use crate::capture::{CaptureEvent, MediaChunk};
use crate::session::{Session, SessionDraft, SessionLibrary};
use crate::store::StoreError;
use crate::util::Clock;

pub const RECORDER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct SessionAssembler {
    library: SessionLibrary,
    clock: Arc<dyn Clock>,
}

impl SessionAssembler {
    pub fn new(library: SessionLibrary, clock: Arc<dyn Clock>) -> Self {
        Self { library, clock }
    }

    /// Assign identity, timestamps and recorder version. Values already
    /// present in the draft are kept, so imported history survives.
    pub fn assemble(&self, draft: SessionDraft) -> Session {
        let now = self.clock.now_ms();
        Session {
            id: draft.id.unwrap_or_else(uuid::Uuid::new_v4),
            name: draft.name,
            tags: draft.tags,
            create_timestamp: draft.create_timestamp.unwrap_or(now),
            modify_timestamp: draft.modify_timestamp.unwrap_or(now),
            recorder_version: draft
                .recorder_version
                .unwrap_or_else(|| RECORDER_VERSION.to_string()),
        }
    }

    pub async fn persist(
        &self,
        session: &Session,
        events: &[CaptureEvent],
        media_chunks: &[MediaChunk],
    ) -> Result<(), StoreError> {
        self.library.save_session(session, events, media_chunks).await
    }
}

impl std::fmt::Debug for SessionAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAssembler").finish()
    }
}
