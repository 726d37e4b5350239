//! ffmpeg-backed live RTSP → HLS engine.

use super::{EngineFactory, EngineSignal, EngineSignals, TranscodeEngine, DEFAULT_PLAYLIST_NAME};
use crate::playlist::MediaPlaylist;
use crate::template::TemplateContext;
use crate::tools::check_tool_with_arg;
use crate::workspace::remove_dir_if_exists;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Signal channel capacity per run.
const SIGNAL_BUFFER: usize = 32;

/// Number of stderr lines kept for error messages.
const STDERR_TAIL: usize = 8;

/// Extra time on top of the grace period before the monitor is aborted.
const STOP_SLACK: Duration = Duration::from_secs(2);

/// ffmpeg engine settings. This is the `[engine]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegSettings {
    /// Path to the ffmpeg binary. Resolved through `PATH` when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// RTSP transport passed as `-rtsp_transport` for `rtsp://` inputs.
    #[serde(default = "default_rtsp_transport")]
    pub rtsp_transport: String,

    /// Target segment duration in seconds.
    #[serde(default = "default_hls_time")]
    pub hls_time: u32,

    /// Number of segments kept in the live playlist.
    #[serde(default = "default_hls_list_size")]
    pub hls_list_size: u32,

    /// Segments the playlist must list before output counts as playable.
    #[serde(default = "default_min_ready_segments")]
    pub min_ready_segments: usize,

    /// Playlist poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Time ffmpeg gets to quit after `q` before it is killed, in milliseconds.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Extra arguments placed before `-i`. Supports `{input}`, `{output_dir}`,
    /// `{playlist}` and `{generation}` placeholders.
    #[serde(default)]
    pub input_args: Vec<String>,

    /// Extra arguments placed before the output playlist.
    #[serde(default)]
    pub output_args: Vec<String>,
}

fn default_rtsp_transport() -> String {
    "tcp".to_string()
}

fn default_hls_time() -> u32 {
    2
}

fn default_hls_list_size() -> u32 {
    6
}

fn default_min_ready_segments() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_stop_grace_ms() -> u64 {
    2000
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            rtsp_transport: default_rtsp_transport(),
            hls_time: default_hls_time(),
            hls_list_size: default_hls_list_size(),
            min_ready_segments: default_min_ready_segments(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }
}

impl FfmpegSettings {
    /// Program to spawn.
    pub fn program(&self) -> PathBuf {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Build the ffmpeg argument list for one run.
    pub fn build_args(&self, input_url: &str, output_dir: &Path) -> Vec<String> {
        let ctx = TemplateContext::new().with_output(input_url, output_dir, DEFAULT_PLAYLIST_NAME);

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
        ];

        args.extend(ctx.substitute_all(&self.input_args));

        if input_url.starts_with("rtsp://") || input_url.starts_with("rtsps://") {
            args.push("-rtsp_transport".into());
            args.push(self.rtsp_transport.clone());
        }

        args.extend([
            "-i".into(),
            input_url.to_string(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            self.hls_time.to_string(),
            "-hls_list_size".into(),
            self.hls_list_size.to_string(),
            "-hls_flags".into(),
            "delete_segments+omit_endlist".into(),
            "-hls_segment_filename".into(),
            output_dir.join("seg%05d.ts").display().to_string(),
        ]);

        args.extend(ctx.substitute_all(&self.output_args));
        args.push(output_dir.join(DEFAULT_PLAYLIST_NAME).display().to_string());

        args
    }
}

/// A single ffmpeg run.
struct Run {
    output_dir: PathBuf,
    shutdown: oneshot::Sender<()>,
    monitor: JoinHandle<()>,
}

/// Live RTSP → HLS engine driving an ffmpeg child process.
///
/// Live input redirection is not supported; callers restart instead.
pub struct FfmpegEngine {
    settings: FfmpegSettings,
    run: Option<Run>,
}

impl FfmpegEngine {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self {
            settings,
            run: None,
        }
    }

    pub fn settings(&self) -> &FfmpegSettings {
        &self.settings
    }

    /// Whether a run is currently owned by this engine.
    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .map(|run| !run.monitor.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        check_tool_with_arg(&self.settings.program().to_string_lossy(), "-version").available
    }

    async fn start(&mut self, input_url: &str, output_dir: &Path) -> Result<EngineSignals> {
        if input_url.trim().is_empty() {
            return Err(Error::InvalidInput("input URL is empty".to_string()));
        }
        if !output_dir.is_dir() {
            return Err(Error::DirectoryNotFound {
                path: output_dir.to_path_buf(),
            });
        }

        self.stop().await;

        let program = self.settings.program();
        let args = self.settings.build_args(input_url, output_dir);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            program = %program.display(),
            output_dir = %output_dir.display(),
            "Spawning ffmpeg: {}",
            args.join(" ")
        );

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn_failed("ffmpeg", e.to_string()))?;

        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let monitor = Monitor {
            playlist_path: output_dir.join(DEFAULT_PLAYLIST_NAME),
            min_ready_segments: self.settings.min_ready_segments.max(1),
            poll_interval: self.settings.poll_interval(),
            stop_grace: self.settings.stop_grace(),
            tx,
        };

        self.run = Some(Run {
            output_dir: output_dir.to_path_buf(),
            shutdown: shutdown_tx,
            monitor: tokio::spawn(monitor.run(child, shutdown_rx)),
        });

        Ok(rx)
    }

    async fn stop(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        let Run {
            output_dir,
            shutdown,
            mut monitor,
        } = run;

        // The monitor may already be gone if ffmpeg exited on its own.
        let _ = shutdown.send(());

        let bound = self.settings.stop_grace() + STOP_SLACK;
        match tokio::time::timeout(bound, &mut monitor).await {
            Ok(Ok(())) => {}
            Ok(Err(_e)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("ffmpeg monitor task failed: {}", _e);
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("ffmpeg did not stop within {:?}, aborting monitor", bound);
                monitor.abort();
            }
        }

        if let Err(_e) = remove_dir_if_exists(&output_dir) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                output_dir = %output_dir.display(),
                "ResourceCleanupError: {}",
                _e
            );
        }
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            // Dropping the task drops the child, which kills it.
            run.monitor.abort();
        }
    }
}

/// Why the monitor loop ended.
enum Outcome {
    Shutdown,
    Exited(Option<i32>),
}

/// Watches one ffmpeg child: playlist readiness, progress, stderr, exit.
struct Monitor {
    playlist_path: PathBuf,
    min_ready_segments: usize,
    poll_interval: Duration,
    stop_grace: Duration,
    tx: mpsc::Sender<EngineSignal>,
}

impl Monitor {
    async fn run(self, mut child: Child, mut shutdown: oneshot::Receiver<()>) {
        // `Child::wait` closes stdin, so hold it here for the quit request.
        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
        let mut stdout_open = stdout.is_some();
        let mut stderr_open = stderr.is_some();

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ready = false;
        let mut last_segments = 0usize;
        let mut bitrate_kbps: Option<f64> = None;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break Outcome::Shutdown,
                status = child.wait() => {
                    break Outcome::Exited(status.ok().and_then(|s| s.code()));
                }
                line = next_line(&mut stdout), if stdout_open => match line {
                    Some(line) => {
                        if let Some(kbps) = parse_bitrate(&line) {
                            bitrate_kbps = Some(kbps);
                        }
                    }
                    None => stdout_open = false,
                },
                line = next_line(&mut stderr), if stderr_open => match line {
                    Some(line) => {
                        if is_error_line(&line) {
                            let _ = self.tx.try_send(EngineSignal::RuntimeError {
                                message: line.clone(),
                            });
                        }
                        if tail.len() == STDERR_TAIL {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    None => stderr_open = false,
                },
                _ = poll.tick() => {
                    let Some((listed, produced)) = read_segments(&self.playlist_path).await else {
                        continue;
                    };
                    if !ready {
                        if listed >= self.min_ready_segments {
                            ready = true;
                            last_segments = produced;
                            let signal = EngineSignal::Ready { segments: produced };
                            if self.tx.send(signal).await.is_err() {
                                #[cfg(feature = "tracing")]
                                tracing::debug!("No listener for ffmpeg readiness");
                            }
                        }
                    } else if produced != last_segments {
                        last_segments = produced;
                        let _ = self.tx.try_send(EngineSignal::Progress {
                            segments: produced,
                            bitrate_kbps,
                        });
                    }
                }
            }
        };

        match outcome {
            Outcome::Shutdown => terminate(&mut child, stdin, self.stop_grace).await,
            Outcome::Exited(code) => {
                let message = exit_message(code, &tail);
                #[cfg(feature = "tracing")]
                tracing::warn!(?code, "ffmpeg exited: {}", message);
                let _ = self.tx.send(EngineSignal::Exited { code, message }).await;
            }
        }
    }
}

/// Ask ffmpeg to quit, then kill it after the grace period.
async fn terminate(child: &mut Child, stdin: Option<ChildStdin>, grace: Duration) {
    if let Some(mut stdin) = stdin {
        let _ = stdin.write_all(b"q\n").await;
        let _ = stdin.flush().await;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("ffmpeg quit gracefully");
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("ffmpeg ignored quit request, killing");
            let _ = child.kill().await;
        }
    }
}

/// Next line from an optional line reader. Pending forever when there is no
/// reader; `None` on end of stream or read error.
async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

/// Listed and produced segment counts of the playlist, if it is readable.
async fn read_segments(playlist_path: &Path) -> Option<(usize, usize)> {
    let content = tokio::fs::read_to_string(playlist_path).await.ok()?;
    let playlist = MediaPlaylist::parse(&content).ok()?;
    Some((
        playlist.segments.len(),
        playlist.produced_segments() as usize,
    ))
}

/// Parse a `bitrate=` line from `-progress` output, in kbit/s.
fn parse_bitrate(line: &str) -> Option<f64> {
    line.trim()
        .strip_prefix("bitrate=")?
        .trim()
        .strip_suffix("kbits/s")?
        .trim()
        .parse()
        .ok()
}

fn is_error_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("error") || lower.contains("failed") || lower.contains("refused")
}

fn exit_message(code: Option<i32>, tail: &VecDeque<String>) -> String {
    let detail: Vec<&str> = tail
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(String::as_str)
        .collect();

    let status = match code {
        Some(code) => format!("ffmpeg exited with code {}", code),
        None => "ffmpeg was terminated by a signal".to_string(),
    };

    if detail.is_empty() {
        status
    } else {
        format!("{}: {}", status, detail.join("; "))
    }
}

/// Factory producing [`FfmpegEngine`]s that share one set of settings.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngineFactory {
    settings: FfmpegSettings,
}

impl FfmpegEngineFactory {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn is_available(&self) -> bool {
        check_tool_with_arg(&self.settings.program().to_string_lossy(), "-version").available
    }

    fn create(&self) -> Box<dyn TranscodeEngine> {
        Box::new(FfmpegEngine::new(self.settings.clone()))
    }
}
