//! Integration tests for session persistence
//!
//! Cover the failure path a popup user actually hits (save fails, retry
//! succeeds) and durability across database reopen.

use std::sync::Arc;

use serde_json::json;

use super::common::rig::SystemRig;
use reel::capture::{CaptureEvent, MediaChunk};
use reel::session::{SessionAssembler, SessionDraft, SessionLibrary};
use reel::store::{Database, SqliteStore};
use reel::{ControlError, ManualClock};

#[tokio::test]
async fn failed_save_is_not_listed_until_a_retry_succeeds() {
    let rig = SystemRig::new(1_000).await;
    let (_page, engine) = rig.open_page("Flaky Disk");

    rig.control.start_recording().await.expect("start");
    rig.clock.set(1_010);
    assert!(engine.emit_event(json!({ "n": 1 })));

    // The recorder's own bookkeeping write goes through, then the session
    // payload writes start failing.
    rig.store.fail_puts_after(1);
    let err = rig.control.stop_recording(None).await.expect_err("save fails");
    assert!(matches!(err, ControlError::Store(_)));
    assert!(rig.control.has_pending_save());
    assert!(rig
        .control
        .library()
        .get_all_sessions()
        .await
        .expect("list")
        .is_empty());

    rig.store.clear_failure();
    let session = rig.control.retry_save().await.expect("retry");
    assert!(!rig.control.has_pending_save());

    let sessions = rig.control.library().get_all_sessions().await.expect("list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, session.id);
    let events = rig.control.library().get_events(session.id).await.expect("events");
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn sessions_survive_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reel.db");

    let session = {
        let store = Arc::new(SqliteStore::new(Database::open(path.clone()).expect("open")));
        let library = SessionLibrary::new(store);
        let assembler = SessionAssembler::new(library, ManualClock::new(42_000));
        let session = assembler.assemble(SessionDraft::named("Durable"));
        assembler
            .persist(
                &session,
                &[CaptureEvent::new(42_100, json!({ "kind": "click" }))],
                &[MediaChunk::new(vec![1u8, 2, 3])],
            )
            .await
            .expect("persist");
        session
    };

    let store = Arc::new(SqliteStore::new(Database::open(path).expect("reopen")));
    let library = SessionLibrary::new(store);
    assert_eq!(library.get_all_sessions().await.expect("list"), vec![session.clone()]);
    assert_eq!(library.get_events(session.id).await.expect("events").len(), 1);
    assert_eq!(
        library.get_media_chunks(session.id).await.expect("media"),
        vec![MediaChunk::new(vec![1u8, 2, 3])]
    );
}

#[tokio::test]
async fn exported_recording_imports_as_a_new_session() {
    let rig = SystemRig::new(1_000).await;
    let (_page, engine) = rig.open_page("Exported Page");

    rig.control.start_recording().await.expect("start");
    rig.clock.set(1_010);
    assert!(engine.emit_event(json!({ "n": 1 })));
    let session = rig.control.stop_recording(None).await.expect("stop");

    let dir = tempfile::tempdir().expect("tempdir");
    let library = rig.control.library();
    let path = library.export_session(session.id, dir.path()).await.expect("export");

    let imported = library.import_session(&path).await.expect("import");
    assert_ne!(imported.id, session.id);
    assert_eq!(imported.name, session.name);
    assert_eq!(library.get_all_sessions().await.expect("list").len(), 2);
    assert_eq!(
        library.get_events(imported.id).await.expect("imported events"),
        library.get_events(session.id).await.expect("original events")
    );
}
