//! Transcoding engine abstraction.
//!
//! An engine turns one live input URL into an HLS playlist plus segments in
//! an output directory. It reports what it observes as raw [`EngineSignal`]s;
//! deciding what those signals mean for a session is left to the caller.

mod ffmpeg;

pub use ffmpeg::{FfmpegEngine, FfmpegEngineFactory, FfmpegSettings};

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Default playlist file name written into the output directory.
pub const DEFAULT_PLAYLIST_NAME: &str = "index.m3u8";

/// Raw signal observed from a running engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// Output is playable: the playlist lists at least the configured
    /// number of segments. Sent once per run.
    Ready { segments: usize },
    /// Periodic progress after readiness.
    Progress {
        segments: usize,
        bitrate_kbps: Option<f64>,
    },
    /// The engine reported an error but may still be running.
    RuntimeError { message: String },
    /// The engine process exited on its own. Always the last signal.
    Exited { code: Option<i32>, message: String },
}

impl EngineSignal {
    /// Whether this signal ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited { .. })
    }
}

/// Receiver side of an engine run's signal channel.
///
/// The channel closes when the run is stopped.
pub type EngineSignals = mpsc::Receiver<EngineSignal>;

/// A live transcoding engine.
///
/// One instance drives at most one run at a time. Calling [`start`] while a
/// run is active stops the old run first.
///
/// [`start`]: TranscodeEngine::start
#[async_trait]
pub trait TranscodeEngine: Send {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Whether the engine can run on this host. Never spawns a long-lived
    /// process.
    fn is_available(&self) -> bool;

    /// File name of the playlist written into the output directory.
    fn playlist_name(&self) -> &str {
        DEFAULT_PLAYLIST_NAME
    }

    /// Spawn the engine reading `input_url` and writing HLS into `output_dir`.
    ///
    /// The returned `Result` only reports whether the spawn succeeded;
    /// readiness and failures after that arrive on the signal channel.
    async fn start(&mut self, input_url: &str, output_dir: &Path) -> Result<EngineSignals>;

    /// Swap the input of the running engine without restarting it.
    ///
    /// Engines that cannot do this return [`Error::Unsupported`] and the
    /// caller falls back to stop + start.
    async fn redirect_input(&mut self, input_url: &str) -> Result<EngineSignals> {
        let _ = input_url;
        Err(Error::unsupported(format!(
            "{} cannot redirect a live input",
            self.name()
        )))
    }

    /// Stop the current run and remove its output directory.
    ///
    /// Idempotent. Cleanup failures are logged, never returned.
    async fn stop(&mut self);
}

/// Creates engines for new sessions.
pub trait EngineFactory: Send + Sync {
    /// Whether engines created by this factory can run on this host.
    fn is_available(&self) -> bool;

    /// Create a fresh, idle engine.
    fn create(&self) -> Box<dyn TranscodeEngine>;
}
