//! Shared test harness for integration tests.
//!
//! Provides a scripted [`FakeEngine`] (through [`FakeEngineFactory`]), a
//! [`RecordingSurface`] that logs what the session asked the player to do,
//! and [`TestHarness`] which builds an orchestrator over a temporary output
//! root. The [`TestHarness::with_server`] constructor starts Axum on a random
//! port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

use camrelay::config::Config;
use camrelay::conversion::SupervisorOptions;
use camrelay::playback::{PlaybackSurface, SurfaceContext, SurfaceEvent};
use camrelay::server::{create_router, AppContext};
use camrelay::session::{SessionEvent, SessionEvents, SessionOrchestrator};
use camrelay_av::{
    EngineFactory, EngineSignal, EngineSignals, MediaPlaylist, SegmentEntry, TranscodeEngine,
};
use camrelay_common::Camera;

pub const FRONT_URL: &str = "rtsp://cam1/live";
pub const REAR_URL: &str = "rtsp://cam2/live";

/// How long tests wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fake engine
// ---------------------------------------------------------------------------

/// What a [`FakeEngine`] does when driven.
#[derive(Debug, Clone)]
pub struct EngineScript {
    /// `start` fails as if the process could not be spawned.
    pub fail_spawn: bool,
    /// Send `Ready` right after `start`/`redirect_input`.
    pub auto_ready: bool,
    /// Accept `redirect_input` instead of reporting it unsupported.
    pub redirect: bool,
}

impl Default for EngineScript {
    fn default() -> Self {
        Self {
            fail_spawn: false,
            auto_ready: true,
            redirect: false,
        }
    }
}

/// Calls observed across all engines of a factory.
#[derive(Debug, Default)]
pub struct EngineCalls {
    pub starts: AtomicUsize,
    pub redirects: AtomicUsize,
    pub stops: AtomicUsize,
    /// Input URL of every successful start or redirect, in order.
    pub inputs: Mutex<Vec<String>>,
    /// Output directory of every successful start.
    pub output_dirs: Mutex<Vec<PathBuf>>,
    /// Sender of the active run, for injecting signals.
    live: Mutex<Option<mpsc::Sender<EngineSignal>>>,
}

impl EngineCalls {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Sender of the active run, kept alive by the caller past `stop`.
    pub fn live_sender(&self) -> Option<mpsc::Sender<EngineSignal>> {
        self.live.lock().clone()
    }

    /// Send a signal on the active run. Returns `false` without one.
    pub async fn signal(&self, signal: EngineSignal) -> bool {
        let tx = self.live.lock().clone();
        match tx {
            Some(tx) => tx.send(signal).await.is_ok(),
            None => false,
        }
    }
}

pub struct FakeEngine {
    script: EngineScript,
    calls: Arc<EngineCalls>,
}

impl FakeEngine {
    fn open_run(&self, input_url: &str) -> EngineSignals {
        let (tx, rx) = mpsc::channel(16);
        if self.script.auto_ready {
            let _ = tx.try_send(EngineSignal::Ready { segments: 1 });
        }
        self.calls.inputs.lock().push(input_url.to_string());
        // The run lives until the sender is dropped by `stop`.
        *self.calls.live.lock() = Some(tx);
        rx
    }
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn start(
        &mut self,
        input_url: &str,
        output_dir: &Path,
    ) -> camrelay_av::Result<EngineSignals> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_spawn {
            return Err(camrelay_av::Error::spawn_failed(
                "fake",
                "No such file or directory",
            ));
        }

        // Stand-in output so tests can check what is reachable afterwards.
        let mut playlist = MediaPlaylist::live(2);
        playlist.segments.push(SegmentEntry {
            duration: 2.0,
            uri: "seg00000.ts".to_string(),
            title: None,
            discontinuity: false,
        });
        std::fs::write(output_dir.join("index.m3u8"), playlist.render())?;
        std::fs::write(output_dir.join("seg00000.ts"), input_url)?;
        self.calls.output_dirs.lock().push(output_dir.to_path_buf());

        Ok(self.open_run(input_url))
    }

    async fn redirect_input(&mut self, input_url: &str) -> camrelay_av::Result<EngineSignals> {
        if !self.script.redirect {
            return Err(camrelay_av::Error::unsupported("fake engine cannot redirect"));
        }
        self.calls.redirects.fetch_add(1, Ordering::SeqCst);
        Ok(self.open_run(input_url))
    }

    async fn stop(&mut self) {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        self.calls.live.lock().take();
    }
}

/// Factory handing out [`FakeEngine`]s that share one [`EngineCalls`].
pub struct FakeEngineFactory {
    pub script: EngineScript,
    pub available: bool,
    pub calls: Arc<EngineCalls>,
}

impl FakeEngineFactory {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script,
            available: true,
            calls: Arc::new(EngineCalls::default()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(EngineScript::default())
        }
    }
}

impl EngineFactory for FakeEngineFactory {
    fn is_available(&self) -> bool {
        self.available
    }

    fn create(&self) -> Box<dyn TranscodeEngine> {
        Box::new(FakeEngine {
            script: self.script.clone(),
            calls: self.calls.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Recording surface
// ---------------------------------------------------------------------------

/// One call made on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Load(String),
    Replace(String),
    Placeholder(String),
    Close,
}

#[derive(Default)]
struct SurfaceLog {
    calls: Vec<SurfaceCall>,
    context: Option<SurfaceContext>,
}

/// Surface that records every call.
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

/// Test-side view of a [`RecordingSurface`].
#[derive(Clone)]
pub struct SurfaceProbe {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new() -> (Box<dyn PlaybackSurface>, SurfaceProbe) {
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        (
            Box::new(Self { log: log.clone() }),
            SurfaceProbe { log },
        )
    }
}

#[async_trait]
impl PlaybackSurface for RecordingSurface {
    fn attach(&mut self, context: SurfaceContext) {
        self.log.lock().context = Some(context);
    }

    async fn load(&mut self, url: &str) {
        self.log.lock().calls.push(SurfaceCall::Load(url.to_string()));
    }

    async fn replace_source(&mut self, url: &str) {
        self.log
            .lock()
            .calls
            .push(SurfaceCall::Replace(url.to_string()));
    }

    async fn show_placeholder(&mut self, message: &str) {
        self.log
            .lock()
            .calls
            .push(SurfaceCall::Placeholder(message.to_string()));
    }

    async fn close(&mut self) {
        self.log.lock().calls.push(SurfaceCall::Close);
    }
}

impl SurfaceProbe {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.log.lock().calls.clone()
    }

    /// URLs handed to the surface, loads and replacements alike.
    pub fn urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Load(url) | SurfaceCall::Replace(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn cameras(&self) -> Vec<Camera> {
        self.log
            .lock()
            .context
            .as_ref()
            .map(|ctx| ctx.setup.cameras.clone())
            .unwrap_or_default()
    }

    /// Report an event as the player would.
    pub fn send(&self, event: SurfaceEvent) {
        let log = self.log.lock();
        let ctx = log.context.as_ref().expect("surface was not attached");
        // The receiver is gone once the session has ended.
        let _ = ctx.events.send(event);
    }

    pub fn switch_to(&self, camera: Camera) {
        self.send(SurfaceEvent::SwitchCameraRequested { camera });
    }

    pub fn close(&self) {
        self.send(SurfaceEvent::Closed);
    }
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Next session event, failing the test after [`EVENT_TIMEOUT`].
pub async fn next_event(events: &mut SessionEvents) -> SessionEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.next())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream ended")
}

/// Skip events until a status event with `status` arrives.
pub async fn wait_for_status(events: &mut SessionEvents, status: &str) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = event.status() == Some(status);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Assert no event arrives within `wait`.
pub async fn assert_quiet(events: &mut SessionEvents, wait: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(wait, events.next()).await {
        panic!("unexpected session event: {:?}", event);
    }
}

/// Poll `cond` until it holds, failing the test after [`EVENT_TIMEOUT`].
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Async variant of [`wait_until`].
pub async fn eventually<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !cond().await {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the event stream to end.
pub async fn assert_ends(events: &mut SessionEvents) {
    loop {
        match tokio::time::timeout(EVENT_TIMEOUT, events.next()).await {
            Ok(None) => return,
            Ok(Some(SessionEvent::Closed)) => panic!("unexpected second Closed event"),
            Ok(Some(_)) => continue,
            Err(_) => panic!("session event stream did not end"),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Config whose output root lives in `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.conversion.output_root = dir.join("hls");
    config.conversion.start_timeout_secs = 5;
    config.conversion.switch_timeout_secs = 5;
    config
}

/// Orchestrator over a [`FakeEngineFactory`] and a temporary output root.
pub struct TestHarness {
    pub ctx: AppContext,
    pub calls: Arc<EngineCalls>,
    pub output_root: PathBuf,
    _dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_factory(FakeEngineFactory::new(EngineScript::default()))
    }

    pub fn with_factory(factory: FakeEngineFactory) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = test_config(dir.path());
        Self::with_config(factory, config, dir)
    }

    pub fn with_config(factory: FakeEngineFactory, config: Config, dir: TempDir) -> Self {
        let calls = factory.calls.clone();
        let output_root = config.conversion.output_root.clone();
        let orchestrator = Arc::new(SessionOrchestrator::new(
            Arc::new(factory),
            SupervisorOptions::from_config(&config),
        ));

        let ctx = AppContext {
            config: Arc::new(config),
            orchestrator,
        };

        Self {
            ctx,
            calls,
            output_root,
            _dir: dir,
        }
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.ctx.orchestrator
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Serve this harness on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = create_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }
}
