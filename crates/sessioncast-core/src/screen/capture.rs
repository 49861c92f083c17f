use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

use super::compressor::FrameCompressor;
use super::ScreenFrame;
use crate::tmux::Multiplexer;

/// Receives each emitted frame. Sink panics are caught and logged; the
/// loop never stops over them.
pub type FrameSink = Arc<dyn Fn(ScreenFrame) + Send + Sync>;

pub const DEFAULT_ACTIVE_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(2);
pub const DEFAULT_FORCE_SEND_INTERVAL: Duration = Duration::from_secs(10);

/// Capture tunables. All hot-swappable: every tick reads the current
/// values, so changes apply from the next tick on.
#[derive(Debug)]
pub struct CaptureSettings {
    active_interval_ms: AtomicU64,
    idle_interval_ms: AtomicU64,
    idle_threshold_ms: AtomicU64,
    force_send_interval_ms: AtomicU64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            active_interval_ms: AtomicU64::new(DEFAULT_ACTIVE_INTERVAL.as_millis() as u64),
            idle_interval_ms: AtomicU64::new(DEFAULT_IDLE_INTERVAL.as_millis() as u64),
            idle_threshold_ms: AtomicU64::new(DEFAULT_IDLE_THRESHOLD.as_millis() as u64),
            force_send_interval_ms: AtomicU64::new(DEFAULT_FORCE_SEND_INTERVAL.as_millis() as u64),
        }
    }
}

impl CaptureSettings {
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_active_interval(&self, interval: Duration) {
        self.active_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_idle_interval(&self, interval: Duration) {
        self.idle_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms.load(Ordering::Relaxed))
    }

    pub fn set_idle_threshold(&self, threshold: Duration) {
        self.idle_threshold_ms
            .store(threshold.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn force_send_interval(&self) -> Duration {
        Duration::from_millis(self.force_send_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_force_send_interval(&self, interval: Duration) {
        self.force_send_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }
}

struct CaptureHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Adaptive per-session screen polling.
///
/// Each streamed session owns one loop: poll fast while the pane keeps
/// changing, drop to the idle cadence once it has been quiet past the
/// idle threshold, and force a frame out at least every
/// `force_send_interval` so viewers never go stale. One loop means at
/// most one tick in flight per session.
pub struct ScreenCapture {
    tmux: Arc<dyn Multiplexer>,
    compressor: Arc<FrameCompressor>,
    settings: Arc<CaptureSettings>,
    tasks: DashMap<String, CaptureHandle>,
}

impl ScreenCapture {
    pub fn new(tmux: Arc<dyn Multiplexer>) -> Self {
        Self::with_compressor(tmux, FrameCompressor::new())
    }

    pub fn with_compressor(tmux: Arc<dyn Multiplexer>, compressor: FrameCompressor) -> Self {
        Self {
            tmux,
            compressor: Arc::new(compressor),
            settings: Arc::new(CaptureSettings::default()),
            tasks: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Start the capture loop for `session`, delivering frames to `sink`.
    /// A second start for the same session is refused.
    pub fn start(&self, session: &str, sink: FrameSink) {
        if self.tasks.contains_key(session) {
            warn!(session, "capture already running");
            return;
        }

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(capture_loop(
            session.to_string(),
            Arc::clone(&self.tmux),
            Arc::clone(&self.compressor),
            Arc::clone(&self.settings),
            Arc::clone(&running),
            sink,
        ));
        self.tasks
            .insert(session.to_string(), CaptureHandle { running, task });
        info!(session, "started screen capture");
    }

    /// Stop capturing `session`. The pending tick is cancelled; a tick
    /// already past capture observes the cleared flag and skips delivery.
    pub fn stop(&self, session: &str) {
        if let Some((_, handle)) = self.tasks.remove(session) {
            handle.running.store(false, Ordering::Release);
            handle.task.abort();
            info!(session, "stopped screen capture");
        }
    }

    pub fn stop_all(&self) {
        let sessions: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for session in sessions {
            self.stop(&session);
        }
    }

    pub fn is_capturing(&self, session: &str) -> bool {
        self.tasks.contains_key(session)
    }

    /// Stop every loop and wait up to five seconds for them to wind
    /// down, aborting whatever is left.
    pub async fn close(&self) {
        let handles: Vec<(String, CaptureHandle)> = {
            let sessions: Vec<String> =
                self.tasks.iter().map(|entry| entry.key().clone()).collect();
            sessions
                .into_iter()
                .filter_map(|session| self.tasks.remove(&session))
                .collect()
        };

        for (_, handle) in &handles {
            handle.running.store(false, Ordering::Release);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        for (session, handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut task = handle.task;
            if time::timeout(remaining, &mut task).await.is_err() {
                warn!(session, "capture loop did not drain, aborting");
                task.abort();
            }
        }
    }
}

async fn capture_loop(
    session: String,
    tmux: Arc<dyn Multiplexer>,
    compressor: Arc<FrameCompressor>,
    settings: Arc<CaptureSettings>,
    running: Arc<AtomicBool>,
    sink: FrameSink,
) {
    let mut last_text = String::new();
    let mut last_change = Instant::now();
    let mut last_send: Option<Instant> = None;
    let mut idle = false;

    loop {
        if !running.load(Ordering::Acquire) {
            return;
        }

        // A failed capture is transient: keep the cadence, keep the state.
        if let Some(content) = tmux.capture_pane_for_stream(&session).await {
            let now = Instant::now();
            let changed = content != last_text;
            let force = last_send
                .map_or(true, |sent| now.duration_since(sent) >= settings.force_send_interval());

            if changed {
                last_text = content;
                last_change = now;
                idle = false;
            } else if now.duration_since(last_change) >= settings.idle_threshold() {
                idle = true;
            }

            if changed || force {
                let frame = compressor.compress_frame(&session, &last_text);
                // stop() may have landed while we were capturing; deliver
                // only while the flag still holds.
                if running.load(Ordering::Acquire) {
                    if catch_unwind(AssertUnwindSafe(|| sink(frame))).is_err() {
                        warn!(session, "frame sink panicked");
                    }
                    last_send = Some(now);
                }
            }
        }

        let delay = if idle {
            settings.idle_interval()
        } else {
            settings.active_interval()
        };
        time::sleep(delay).await;
    }
}
