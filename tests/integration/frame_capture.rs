//! Integration tests for cross-origin frame capture
//!
//! Frames never receive control traffic; they follow the shared recorder
//! state and must converge on it from any starting point.

use super::common::rig::{wait_until, SystemRig};

#[tokio::test]
async fn frames_arm_with_the_page_and_disarm_on_stop() {
    let rig = SystemRig::new(1_000).await;
    let (_page, page_engine) = rig.open_page("Host Page");
    let (_frame, frame_engine) = rig.open_frame();

    rig.control.start_recording().await.expect("start");
    wait_until("frame to arm", || frame_engine.is_live()).await;
    assert!(page_engine.is_live());

    rig.control.stop_recording(None).await.expect("stop");
    wait_until("frame to disarm", || !frame_engine.is_live()).await;
}

/// A frame created mid-recording sees the state it missed and catches up.
#[tokio::test]
async fn late_frame_joins_a_running_recording() {
    let rig = SystemRig::new(1_000).await;
    let (_page, _page_engine) = rig.open_page("Host Page");
    rig.control.start_recording().await.expect("start");

    let (_frame, frame_engine) = rig.open_frame();
    wait_until("late frame to arm", || frame_engine.is_live()).await;
}

#[tokio::test]
async fn frames_follow_pause_and_resume() {
    let rig = SystemRig::new(1_000).await;
    let (_page, _page_engine) = rig.open_page("Host Page");
    let (_frame, frame_engine) = rig.open_frame();

    rig.control.start_recording().await.expect("start");
    wait_until("frame to arm", || frame_engine.is_live()).await;

    rig.control.pause_recording().await.expect("pause");
    wait_until("frame to disarm on pause", || !frame_engine.is_live()).await;

    rig.clock.set(2_000);
    rig.control.resume_recording().await.expect("resume");
    wait_until("frame to re-arm on resume", || frame_engine.is_live()).await;
    assert_eq!(frame_engine.start_count(), 2);

    rig.control.stop_recording(None).await.expect("stop");
    wait_until("frame to disarm on stop", || !frame_engine.is_live()).await;
}

/// A closed frame stops following; the recording is unaffected.
#[tokio::test]
async fn closing_a_frame_leaves_the_recording_running() {
    let rig = SystemRig::new(1_000).await;
    let (_page, page_engine) = rig.open_page("Host Page");
    let (frame, frame_engine) = rig.open_frame();

    rig.control.start_recording().await.expect("start");
    wait_until("frame to arm", || frame_engine.is_live()).await;

    frame.close();
    assert!(page_engine.is_live());
    rig.control.stop_recording(None).await.expect("stop");
    assert!(!page_engine.is_live());
}
