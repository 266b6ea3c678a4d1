//! Integration tests for the core recording flow
//!
//! Drives a full system rig through start, pause, resume, page switches
//! and stop, checking the stored timeline at the end of each run.

use serde_json::json;

use super::common::rig::SystemRig;
use reel::{ChannelError, ControlError, RecorderState, RecorderStatus};

#[tokio::test]
async fn full_recording_round_trip() {
    let rig = SystemRig::new(1_000).await;
    let (_page, engine) = rig.open_page("Checkout | Example Shop");

    rig.control.start_recording().await.expect("start");
    rig.clock.set(1_010);
    assert!(engine.emit_event(json!({ "kind": "click" })));
    rig.clock.set(1_020);
    assert!(engine.emit_media([0xde, 0xad, 0xbe, 0xef]));
    rig.clock.set(1_030);
    assert!(engine.emit_event(json!({ "kind": "scroll" })));

    let session = rig.control.stop_recording(None).await.expect("stop");
    assert_eq!(session.name, "Checkout | Example Shop");

    let library = rig.control.library();
    let events = library.get_events(session.id).await.expect("events");
    let stamps: Vec<i64> = events.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![1_010, 1_030]);

    let media = library.get_media_chunks(session.id).await.expect("media");
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].data, vec![0xde, 0xad, 0xbe, 0xef]);

    assert_eq!(rig.state.state(), RecorderState::idle());
    assert!(!engine.is_live());
}

/// The pause gap must disappear from the stored timeline: restored events
/// rebase onto the resume anchor, and live capture continues past it.
#[tokio::test]
async fn recording_continues_across_a_pause() {
    let rig = SystemRig::new(0).await;
    let (_page, engine) = rig.open_page("Single Page");

    rig.control.start_recording().await.expect("start");
    assert!(engine.emit_event(json!({ "n": 0 })));
    rig.clock.set(100);
    assert!(engine.emit_event(json!({ "n": 1 })));

    rig.control.pause_recording().await.expect("pause");
    assert!(!engine.is_live());
    assert_eq!(rig.control.elapsed_ms(), Some(100));

    rig.clock.set(5_000);
    rig.control.resume_recording().await.expect("resume");
    rig.clock.set(5_010);
    assert!(engine.emit_event(json!({ "n": 2 })));

    let session = rig
        .control
        .stop_recording(Some("Paused run".to_string()))
        .await
        .expect("stop");
    let events = rig.control.library().get_events(session.id).await.expect("events");
    let stamps: Vec<i64> = events.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![4_900, 5_000, 5_010]);
}

/// Pausing for a switch parks the recording, and the resume lands on
/// whichever page holds focus by then.
#[tokio::test]
async fn recording_follows_a_page_switch() {
    let rig = SystemRig::new(1_000).await;
    let (_page1, engine1) = rig.open_page("First Page");

    rig.control.start_recording().await.expect("start");
    rig.clock.set(1_010);
    assert!(engine1.emit_event(json!({ "page": 1 })));

    rig.control.pause_for_switch().await.expect("pause for switch");
    assert_eq!(rig.state.state().status, RecorderStatus::PausedSwitching);
    assert!(!engine1.is_live());

    // The user lands on another page; it takes focus.
    rig.clock.set(3_000);
    let (page2, engine2) = rig.open_page("Second Page");
    rig.control.resume_recording().await.expect("resume");

    let state = rig.state.state();
    assert_eq!(state.status, RecorderStatus::Recording);
    assert_eq!(state.active_context, Some(page2.context));
    assert!(engine2.is_live());
    assert_eq!(engine1.start_count(), 1);

    rig.clock.set(3_050);
    assert!(engine2.emit_event(json!({ "page": 2 })));

    let session = rig.control.stop_recording(None).await.expect("stop");
    assert_eq!(session.name, "Second Page");
    let events = rig.control.library().get_events(session.id).await.expect("events");
    let stamps: Vec<i64> = events.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![3_000, 3_050]);
}

/// Stop addresses the page that owns the recording, not whichever page
/// happens to hold focus.
#[tokio::test]
async fn stop_works_while_the_page_is_unfocused() {
    let rig = SystemRig::new(1_000).await;
    let (_page, engine) = rig.open_page("Background Page");

    rig.control.start_recording().await.expect("start");
    rig.clock.set(1_010);
    assert!(engine.emit_event(json!({ "n": 1 })));
    rig.hub.set_focused(None);

    let session = rig.control.stop_recording(None).await.expect("stop");
    let events = rig.control.library().get_events(session.id).await.expect("events");
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn second_start_while_recording_is_rejected() {
    let rig = SystemRig::new(1_000).await;
    let (_page, engine) = rig.open_page("Some Page");

    rig.control.start_recording().await.expect("start");
    let err = rig.control.start_recording().await.expect_err("second start");
    assert!(matches!(
        err,
        ControlError::Channel(ChannelError::Rejected { .. })
    ));
    assert_eq!(engine.start_count(), 1);
    assert!(engine.is_live());
}
