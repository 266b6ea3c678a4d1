//! Integration tests for Reel
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod frame_capture;
pub mod persistence;
pub mod recording_flow;
pub mod reload_recovery;
