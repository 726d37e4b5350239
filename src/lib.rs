//! Camrelay - RTSP to HLS relay with live camera switching
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod conversion;
pub mod playback;
pub mod server;
pub mod session;
