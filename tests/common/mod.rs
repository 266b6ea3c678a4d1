//! Shared test utilities for Reel
//!
//! This module provides common helpers for integration tests:
//! - A full-system rig wiring hub, store, pages and control surface
//! - Polling helpers for the asynchronous capture handshakes

pub mod rig;
