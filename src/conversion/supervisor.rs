//! Conversion supervisor.
//!
//! Owns one session's transcoding engine and drives the [`ConverterState`]
//! machine. Lifecycle operations are serialized by the async mutex that
//! guards the engine; state and stats live in a single `RwLock` snapshot, and
//! events are sent while its write lock is held so listeners observe them in
//! transition order.
//!
//! Every start, switch and stop begins a new *epoch*. Engine signals are
//! consumed by a watcher task bound to the epoch it was spawned for; once the
//! epoch moves on (or its cancellation token fires) the watcher's signals are
//! dropped.

use super::error::{ConversionError, Result};
use super::state::{ConverterEvent, ConverterState, ConverterStatus, Stats};
use crate::config::{Config, SwitchPolicy};
use camrelay_av::{EngineSignal, EngineSignals, OutputWorkspace, TranscodeEngine};
use camrelay_common::{urls, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Sender half of a supervisor's event channel.
pub type ConverterEventSender = mpsc::UnboundedSender<ConverterEvent>;

/// Supervisor settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub output_root: PathBuf,
    /// Base URL under which `output_root` is served.
    pub hls_base_url: String,
    pub start_timeout: Duration,
    pub switch_timeout: Duration,
    pub switch_policy: SwitchPolicy,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_root: config.conversion.output_root.clone(),
            hls_base_url: config.server.hls_base_url(),
            start_timeout: config.conversion.start_timeout(),
            switch_timeout: config.conversion.switch_timeout(),
            switch_policy: config.conversion.switch_policy,
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Default)]
struct Snapshot {
    state: ConverterState,
    epoch: u64,
    generation: u64,
    /// Bumped when the input is redirected inside the same generation.
    url_revision: u32,
    hls_url: Option<String>,
    input_url: Option<String>,
    pending_url: Option<String>,
    output_path: Option<PathBuf>,
    started_at: Option<DateTime<Utc>>,
    segments: usize,
    bitrate_kbps: Option<f64>,
    last_error: Option<String>,
    switch_count: u32,
    events: Option<ConverterEventSender>,
    watcher: Option<CancellationToken>,
}

impl Snapshot {
    fn emit(&self, event: ConverterEvent) {
        match self.events {
            Some(ref tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!("No listener for converter event");
                }
            }
            None => tracing::debug!("No converter event sink registered"),
        }
    }

    fn emit_status(&self, status: ConverterStatus, message: String, input_url: Option<String>) {
        self.emit(ConverterEvent::Status {
            status,
            message,
            hls_url: self.hls_url.clone(),
            input_url,
        });
    }

    /// Begin a new epoch, cancelling the current watcher.
    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(token) = self.watcher.take() {
            token.cancel();
        }
        self.epoch
    }

    fn fail(&mut self, err: &ConversionError) {
        let reason = err.into();
        self.next_epoch();
        self.state = ConverterState::Failed(reason);
        self.hls_url = None;
        self.pending_url = None;
        self.output_path = None;
        self.last_error = Some(err.to_string());
        if let ConverterState::Failed(ref reason) = self.state {
            self.emit(ConverterEvent::Error {
                reason: reason.clone(),
            });
        }
    }

    fn to_stats(&self) -> Stats {
        let active = self.state.is_active();
        Stats {
            state: self.state.as_str().to_string(),
            is_converting: active,
            hls_url: self.hls_url.clone(),
            input_url: self.input_url.clone(),
            output_path: self.output_path.clone(),
            started_at: self.started_at,
            uptime_secs: self
                .started_at
                .map(|t| (Utc::now() - t).num_seconds().max(0) as u64),
            segments: self.segments,
            bitrate_kbps: self.bitrate_kbps,
            last_error: self.last_error.clone(),
            switch_count: self.switch_count,
            generation: active.then_some(self.generation),
        }
    }
}

struct Inner {
    session_id: SessionId,
    options: SupervisorOptions,
    workspace: OutputWorkspace,
    playlist_name: String,
    engine: Mutex<Box<dyn TranscodeEngine>>,
    snapshot: RwLock<Snapshot>,
}

impl Inner {
    /// Record a failure for `epoch` unless a newer operation superseded it.
    fn fail(&self, epoch: u64, err: ConversionError) -> ConversionError {
        let mut snap = self.snapshot.write();
        if snap.epoch == epoch {
            tracing::error!(
                session_id = %self.session_id,
                generation = snap.generation,
                "Conversion failed: {}",
                err
            );
            snap.fail(&err);
        }
        err
    }

    fn remove_generation(&self, generation: u64) {
        if let Err(e) = self.workspace.remove_generation(generation) {
            let err = ConversionError::ResourceCleanup(e.to_string());
            tracing::warn!(session_id = %self.session_id, generation, "{}", err);
        }
    }

    fn playlist_url(&self, snap: &Snapshot) -> String {
        let mut url = format!(
            "{}/{}",
            self.options.hls_base_url.trim_end_matches('/'),
            self.workspace
                .relative_playlist(snap.generation, &self.playlist_name)
        );
        if snap.url_revision > 0 {
            url.push_str(&format!("?rev={}", snap.url_revision));
        }
        url
    }

    fn on_ready(&self, epoch: u64, segments: usize) {
        let mut snap = self.snapshot.write();
        let pending = matches!(
            snap.state,
            ConverterState::Starting | ConverterState::Switching
        );
        if snap.epoch != epoch || !pending {
            return;
        }

        if snap.state == ConverterState::Switching {
            snap.switch_count += 1;
            if let Some(url) = snap.pending_url.take() {
                snap.input_url = Some(url);
            }
        }

        let hls_url = self.playlist_url(&snap);
        snap.state = ConverterState::Converting;
        snap.hls_url = Some(hls_url.clone());
        snap.segments = segments;
        if snap.started_at.is_none() {
            snap.started_at = Some(Utc::now());
        }

        tracing::info!(
            session_id = %self.session_id,
            generation = snap.generation,
            "Stream ready at {}",
            hls_url
        );
        let input_url = snap.input_url.clone();
        snap.emit_status(ConverterStatus::Ready, "Stream ready".to_string(), input_url);
    }

    fn on_progress(&self, epoch: u64, segments: usize, bitrate_kbps: Option<f64>) {
        let mut snap = self.snapshot.write();
        if snap.epoch != epoch {
            return;
        }
        snap.segments = segments;
        if bitrate_kbps.is_some() {
            snap.bitrate_kbps = bitrate_kbps;
        }
    }

    fn on_runtime_error(&self, epoch: u64, message: String) {
        let mut snap = self.snapshot.write();
        if snap.epoch != epoch {
            return;
        }
        tracing::debug!(session_id = %self.session_id, "Engine reported: {}", message);
        snap.last_error = Some(message);
    }

    /// Force-stop the run of `epoch` and mark it failed.
    async fn abort_run(&self, epoch: u64, err: ConversionError) {
        let mut engine = self.engine.lock().await;

        let generation = {
            let snap = self.snapshot.read();
            if snap.epoch != epoch || !snap.state.is_active() {
                return;
            }
            snap.generation
        };

        engine.stop().await;
        self.remove_generation(generation);
        self.fail(epoch, err);
    }
}

/// Supervises the conversion of one session.
///
/// Cheap to clone; clones share the same engine and state.
#[derive(Clone)]
pub struct ConversionSupervisor {
    inner: Arc<Inner>,
}

impl ConversionSupervisor {
    pub fn new(
        session_id: SessionId,
        engine: Box<dyn TranscodeEngine>,
        options: SupervisorOptions,
    ) -> Self {
        let workspace = OutputWorkspace::new(&options.output_root, &session_id);
        let playlist_name = engine.playlist_name().to_string();

        Self {
            inner: Arc::new(Inner {
                session_id,
                options,
                workspace,
                playlist_name,
                engine: Mutex::new(engine),
                snapshot: RwLock::new(Snapshot::default()),
            }),
        }
    }

    /// Register the event sink.
    pub fn with_events(self, events: ConverterEventSender) -> Self {
        self.set_event_sender(events);
        self
    }

    /// Replace the event sink.
    pub fn set_event_sender(&self, events: ConverterEventSender) {
        self.inner.snapshot.write().events = Some(events);
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn state(&self) -> ConverterState {
        self.inner.snapshot.read().state.clone()
    }

    /// Whether an engine run is active (starting, converting or switching).
    pub fn is_converting(&self) -> bool {
        self.inner.snapshot.read().state.is_active()
    }

    /// Playlist URL; only set while `Converting`.
    pub fn hls_url(&self) -> Option<String> {
        self.inner.snapshot.read().hls_url.clone()
    }

    /// Directory the current run writes to.
    pub fn hls_output_path(&self) -> Option<PathBuf> {
        self.inner.snapshot.read().output_path.clone()
    }

    /// Input URL of the current (or last) run.
    pub fn input_url(&self) -> Option<String> {
        self.inner.snapshot.read().input_url.clone()
    }

    pub fn get_stats(&self) -> Stats {
        self.inner.snapshot.read().to_stats()
    }

    /// Start converting `input_url`.
    ///
    /// Returns once the engine is spawned; readiness is reported with a
    /// `ready` status event. Spawn failures move the supervisor to `Failed`,
    /// emit one error event and are returned.
    pub async fn start_conversion(&self, input_url: &str) -> Result<()> {
        let input_url = validate_input(input_url)?;
        let mut engine = self.inner.engine.lock().await;

        let (epoch, generation) = {
            let mut snap = self.inner.snapshot.write();
            if !snap.state.can_start() {
                return Err(ConversionError::AlreadyConverting);
            }

            let epoch = snap.next_epoch();
            snap.generation += 1;
            snap.state = ConverterState::Starting;
            snap.hls_url = None;
            snap.pending_url = None;
            snap.output_path = None;
            snap.input_url = Some(input_url.clone());
            snap.started_at = None;
            snap.segments = 0;
            snap.bitrate_kbps = None;
            snap.last_error = None;
            snap.switch_count = 0;

            snap.emit_status(
                ConverterStatus::Connecting,
                format!("Connecting to {}", urls::redact_credentials(&input_url)),
                Some(input_url.clone()),
            );
            (epoch, snap.generation)
        };

        tracing::info!(
            session_id = %self.inner.session_id,
            generation,
            "Starting conversion of {}",
            urls::redact_credentials(&input_url)
        );

        let timeout = self.inner.options.start_timeout;
        self.launch(&mut **engine, epoch, generation, &input_url, timeout)
            .await
    }

    /// Switch the running conversion to another input.
    ///
    /// Switching to the current input (or to the input a switch is already
    /// heading for) does nothing.
    pub async fn switch_to_url(&self, input_url: &str) -> Result<()> {
        let input_url = validate_input(input_url)?;
        let mut engine = self.inner.engine.lock().await;

        let epoch = {
            let mut snap = self.inner.snapshot.write();
            match snap.state {
                ConverterState::Converting
                    if snap.input_url.as_deref() == Some(input_url.as_str()) =>
                {
                    return Ok(());
                }
                ConverterState::Switching
                    if snap.pending_url.as_deref() == Some(input_url.as_str()) =>
                {
                    return Ok(());
                }
                ConverterState::Converting | ConverterState::Switching => {}
                _ => return Err(ConversionError::NotConverting),
            }

            let epoch = snap.next_epoch();
            snap.state = ConverterState::Switching;
            snap.hls_url = None;
            snap.pending_url = Some(input_url.clone());

            snap.emit_status(
                ConverterStatus::Switching,
                format!("Switching to {}", urls::redact_credentials(&input_url)),
                Some(input_url.clone()),
            );
            epoch
        };

        tracing::info!(
            session_id = %self.inner.session_id,
            policy = ?self.inner.options.switch_policy,
            "Switching input to {}",
            urls::redact_credentials(&input_url)
        );

        let timeout = self.inner.options.switch_timeout;

        if self.inner.options.switch_policy == SwitchPolicy::ReuseIfSupported {
            match engine.redirect_input(&input_url).await {
                Ok(signals) => {
                    self.inner.snapshot.write().url_revision += 1;
                    self.spawn_watcher(epoch, signals, timeout);
                    return Ok(());
                }
                Err(e) if e.is_unsupported() => {
                    tracing::debug!("{}; restarting engine", e);
                }
                Err(e) => {
                    engine.stop().await;
                    let generation = self.inner.snapshot.read().generation;
                    self.inner.remove_generation(generation);
                    return Err(self
                        .inner
                        .fail(epoch, ConversionError::EngineRuntime(e.to_string())));
                }
            }
        }

        engine.stop().await;

        let (previous, generation) = {
            let mut snap = self.inner.snapshot.write();
            let previous = snap.generation;
            snap.generation += 1;
            snap.output_path = None;
            (previous, snap.generation)
        };
        self.inner.remove_generation(previous);

        self.launch(&mut **engine, epoch, generation, &input_url, timeout)
            .await
    }

    /// Stop the running conversion and remove its output.
    pub async fn stop_conversion(&self) -> Result<()> {
        let mut engine = self.inner.engine.lock().await;

        let generation = {
            let mut snap = self.inner.snapshot.write();
            if !snap.state.is_active() {
                return Err(ConversionError::NotConverting);
            }
            snap.next_epoch();
            snap.state = ConverterState::Stopping;
            snap.hls_url = None;
            snap.generation
        };

        tracing::info!(session_id = %self.inner.session_id, generation, "Stopping conversion");

        engine.stop().await;
        self.inner.remove_generation(generation);

        let mut snap = self.inner.snapshot.write();
        snap.state = ConverterState::Stopped;
        snap.pending_url = None;
        snap.output_path = None;
        snap.started_at = None;
        let input_url = snap.input_url.clone();
        snap.emit_status(
            ConverterStatus::Stopped,
            "Conversion stopped".to_string(),
            input_url,
        );
        Ok(())
    }

    /// Stop everything, drop the event sink and reset stats.
    ///
    /// Accepted from any state; calling it twice is harmless.
    pub async fn cleanup(&self) {
        let mut engine = self.inner.engine.lock().await;

        {
            let mut snap = self.inner.snapshot.write();
            snap.events = None;
            snap.next_epoch();
            if snap.state.is_active() {
                snap.state = ConverterState::Stopping;
                snap.hls_url = None;
            }
        }

        engine.stop().await;
        if let Err(e) = self.inner.workspace.remove_all() {
            let err = ConversionError::ResourceCleanup(e.to_string());
            tracing::warn!(session_id = %self.inner.session_id, "{}", err);
        }

        let mut snap = self.inner.snapshot.write();
        // Epoch and generation keep counting so no later run reuses them.
        let (epoch, generation) = (snap.epoch, snap.generation);
        *snap = Snapshot {
            epoch,
            generation,
            ..Snapshot::default()
        };

        tracing::debug!(session_id = %self.inner.session_id, "Conversion cleaned up");
    }

    async fn launch(
        &self,
        engine: &mut dyn TranscodeEngine,
        epoch: u64,
        generation: u64,
        input_url: &str,
        timeout: Duration,
    ) -> Result<()> {
        let dir = match self.inner.workspace.prepare(generation) {
            Ok(dir) => dir,
            Err(e) => {
                return Err(self
                    .inner
                    .fail(epoch, ConversionError::EngineSpawn(e.to_string())))
            }
        };

        match engine.start(input_url, &dir).await {
            Ok(signals) => {
                {
                    let mut snap = self.inner.snapshot.write();
                    snap.output_path = Some(dir);
                    snap.url_revision = 0;
                }
                self.spawn_watcher(epoch, signals, timeout);
                Ok(())
            }
            Err(e) => {
                engine.stop().await;
                self.inner.remove_generation(generation);
                Err(self
                    .inner
                    .fail(epoch, ConversionError::EngineSpawn(e.to_string())))
            }
        }
    }

    fn spawn_watcher(&self, epoch: u64, signals: EngineSignals, timeout: Duration) {
        let token = CancellationToken::new();
        {
            let mut snap = self.inner.snapshot.write();
            if snap.epoch != epoch {
                return;
            }
            snap.watcher = Some(token.clone());
        }
        tokio::spawn(watch_run(
            Arc::downgrade(&self.inner),
            epoch,
            signals,
            token,
            timeout,
        ));
    }
}

/// Consume the signals of one engine run.
async fn watch_run(
    inner: Weak<Inner>,
    epoch: u64,
    mut signals: EngineSignals,
    token: CancellationToken,
    timeout: Duration,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut ready = false;

    loop {
        let signal = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = &mut deadline, if !ready => {
                if let Some(inner) = inner.upgrade() {
                    inner.abort_run(epoch, ConversionError::Timeout(timeout)).await;
                }
                return;
            }
            signal = signals.recv() => signal,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };

        match signal {
            Some(EngineSignal::Ready { segments }) => {
                ready = true;
                inner.on_ready(epoch, segments);
            }
            Some(EngineSignal::Progress {
                segments,
                bitrate_kbps,
            }) => inner.on_progress(epoch, segments, bitrate_kbps),
            Some(EngineSignal::RuntimeError { message }) => inner.on_runtime_error(epoch, message),
            Some(EngineSignal::Exited { message, .. }) => {
                inner
                    .abort_run(epoch, ConversionError::EngineRuntime(message))
                    .await;
                return;
            }
            None => {
                inner
                    .abort_run(
                        epoch,
                        ConversionError::EngineRuntime("engine stopped unexpectedly".to_string()),
                    )
                    .await;
                return;
            }
        }
    }
}

fn validate_input(input_url: &str) -> Result<String> {
    let input_url = input_url.trim();
    if input_url.is_empty() {
        return Err(ConversionError::invalid_request("input URL is empty"));
    }
    if !urls::is_stream_url(input_url) {
        return Err(ConversionError::invalid_request(format!(
            "unsupported input URL: {}",
            urls::redact_credentials(input_url)
        )));
    }
    Ok(input_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_input() {
        assert_eq!(
            validate_input("  rtsp://cam/live ").unwrap(),
            "rtsp://cam/live"
        );
        assert!(matches!(
            validate_input(""),
            Err(ConversionError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_input("file:///etc/passwd"),
            Err(ConversionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_epoch_cancels_watcher() {
        let mut snap = Snapshot::default();
        let token = CancellationToken::new();
        snap.watcher = Some(token.clone());

        assert_eq!(snap.next_epoch(), 1);
        assert!(token.is_cancelled());
        assert!(snap.watcher.is_none());
    }

    #[test]
    fn test_snapshot_fail_emits_single_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut snap = Snapshot {
            events: Some(tx),
            state: ConverterState::Starting,
            hls_url: Some("http://x/index.m3u8".into()),
            ..Snapshot::default()
        };

        snap.fail(&ConversionError::EngineSpawn("boom".into()));
        assert_eq!(snap.state.as_str(), "failed");
        assert!(snap.hls_url.is_none());
        assert!(matches!(rx.try_recv(), Ok(ConverterEvent::Error { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stats_generation_only_when_active() {
        let mut snap = Snapshot {
            generation: 3,
            ..Snapshot::default()
        };
        assert_eq!(snap.to_stats(), Stats::inactive());

        snap.state = ConverterState::Converting;
        assert_eq!(snap.to_stats().generation, Some(3));
        assert!(snap.to_stats().is_converting);
    }
}
