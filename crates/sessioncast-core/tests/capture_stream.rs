//! Capture engine behaviour against a scripted multiplexer: the adaptive
//! cadence, change detection, force-send keepalive and stop semantics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use sessioncast_core::screen::{FrameCompressor, FrameSink, ScreenCapture, ScreenFrame};
use sessioncast_core::tmux::{Multiplexer, SpecialKey, TmuxSession, CLEAR_SCREEN_PREFIX};

/// Multiplexer whose pane content is a script under test control.
/// `None` simulates a capture failure. Capture call instants are
/// recorded so tests can observe the polling cadence.
struct ScriptedPane {
    content: Mutex<Option<String>>,
    capture_calls: Mutex<Vec<Instant>>,
}

impl ScriptedPane {
    fn new(content: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            content: Mutex::new(content.map(str::to_string)),
            capture_calls: Mutex::new(Vec::new()),
        })
    }

    fn set_content(&self, content: Option<&str>) {
        *self.content.lock() = content.map(str::to_string);
    }

    fn calls_between(&self, from: Duration, to: Duration, start: Instant) -> usize {
        self.capture_calls
            .lock()
            .iter()
            .filter(|at| {
                let elapsed = at.duration_since(start);
                elapsed >= from && elapsed < to
            })
            .count()
    }
}

#[async_trait]
impl Multiplexer for ScriptedPane {
    async fn list_sessions(&self) -> Vec<TmuxSession> {
        Vec::new()
    }

    async fn session_exists(&self, _name: &str) -> bool {
        true
    }

    async fn create_session(&self, _name: &str, _work_dir: Option<&str>) {}

    async fn kill_session(&self, _name: &str) {}

    async fn send_keys(&self, _target: &str, _keys: &str, _literal: bool) {}

    async fn send_special_key(&self, _target: &str, _key: SpecialKey) {}

    async fn capture_pane(&self, _name: &str, _with_escapes: bool) -> Option<String> {
        self.capture_calls.lock().push(Instant::now());
        self.content.lock().clone()
    }

    async fn resize_window(&self, _name: &str, _cols: u16, _rows: u16) {}

    async fn pane_work_dir(&self, _name: &str) -> Option<String> {
        None
    }
}

fn collecting_sink() -> (FrameSink, Arc<Mutex<Vec<ScreenFrame>>>) {
    let frames: Arc<Mutex<Vec<ScreenFrame>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = frames.clone();
    let sink: FrameSink = Arc::new(move |frame| captured.lock().push(frame));
    (sink, frames)
}

/// Scaled-down intervals so the adaptive schedule is observable without
/// ten-second waits.
fn fast_settings(capture: &ScreenCapture) {
    capture.settings().set_active_interval(Duration::from_millis(20));
    capture.settings().set_idle_interval(Duration::from_millis(80));
    capture.settings().set_idle_threshold(Duration::from_millis(60));
    capture
        .settings()
        .set_force_send_interval(Duration::from_millis(400));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unchanged_content_sends_once_then_only_keepalives() {
    let pane = ScriptedPane::new(Some("ready\n"));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink, frames) = collecting_sink();

    capture.start("s1", sink);
    assert!(capture.is_capturing("s1"));

    // First tick always sends; nothing else changes, so nothing else
    // goes out before the force-send interval.
    sleep(Duration::from_millis(250)).await;
    assert_eq!(frames.lock().len(), 1, "only the first tick should emit");

    // Around the force-send interval exactly one keepalive shows up.
    sleep(Duration::from_millis(350)).await;
    let count = frames.lock().len();
    assert_eq!(count, 2, "expected exactly one forced keepalive");

    let snapshot = frames.lock().clone();
    assert!(snapshot[0].raw_text.starts_with(CLEAR_SCREEN_PREFIX));
    assert!(!snapshot[0].is_compressed);

    capture.stop("s1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn idle_pane_polls_at_the_idle_cadence() {
    let pane = ScriptedPane::new(Some("quiet\n"));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink, _frames) = collecting_sink();

    let start = Instant::now();
    capture.start("s1", sink);
    sleep(Duration::from_millis(600)).await;
    capture.stop("s1");

    // After ~60ms of unchanged content the loop drops from the 20ms
    // active cadence to the 80ms idle cadence: the [300ms, 600ms) window
    // would hold ~15 active polls but only ~4 idle ones.
    let idle_window_calls = pane.calls_between(
        Duration::from_millis(300),
        Duration::from_millis(600),
        start,
    );
    assert!(
        idle_window_calls <= 8,
        "expected idle cadence, saw {idle_window_calls} polls in 300ms"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn content_change_emits_a_new_frame() {
    let pane = ScriptedPane::new(Some("one"));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink, frames) = collecting_sink();

    capture.start("s1", sink);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(frames.lock().len(), 1);

    pane.set_content(Some("two"));
    sleep(Duration::from_millis(200)).await;
    let snapshot = frames.lock().clone();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot[1].raw_text.ends_with("two"));

    capture.stop("s1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_capture_keeps_the_loop_alive() {
    let pane = ScriptedPane::new(None);
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink, frames) = collecting_sink();

    capture.start("s1", sink);
    sleep(Duration::from_millis(200)).await;
    assert!(frames.lock().is_empty(), "null captures must not emit");
    assert!(capture.is_capturing("s1"));

    // Once the pane comes back the same loop picks it up.
    pane.set_content(Some("back"));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(frames.lock().len(), 1);

    capture.stop("s1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_is_final_and_idempotent() {
    let pane = ScriptedPane::new(Some("ready"));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink, frames) = collecting_sink();

    capture.start("s1", sink);
    sleep(Duration::from_millis(100)).await;
    capture.stop("s1");
    capture.stop("s1");
    assert!(!capture.is_capturing("s1"));

    let count_at_stop = frames.lock().len();
    pane.set_content(Some("changed after stop"));
    sleep(Duration::from_millis(300)).await;
    assert_eq!(
        frames.lock().len(),
        count_at_stop,
        "no sink invocations after stop returns"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_start_is_refused() {
    let pane = ScriptedPane::new(Some("ready"));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink_a, frames_a) = collecting_sink();
    let (sink_b, frames_b) = collecting_sink();

    capture.start("s1", sink_a);
    capture.start("s1", sink_b);
    sleep(Duration::from_millis(150)).await;

    assert!(!frames_a.lock().is_empty());
    assert!(frames_b.lock().is_empty(), "second start must be refused");

    capture.stop_all();
    assert!(!capture.is_capturing("s1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_repetitive_pane_is_gzipped() {
    let content = "A".repeat(2000);
    let pane = ScriptedPane::new(Some(content.as_str()));
    let capture = ScreenCapture::with_compressor(pane.clone(), FrameCompressor::new());
    fast_settings(&capture);
    let (sink, frames) = collecting_sink();

    capture.start("s1", sink);
    sleep(Duration::from_millis(150)).await;
    capture.stop("s1");

    let snapshot = frames.lock().clone();
    assert!(!snapshot.is_empty());
    let frame = &snapshot[0];
    assert!(frame.is_compressed);
    let bytes = frame.compressed.as_ref().unwrap();
    assert!(bytes.len() < frame.raw_text.len());

    // The compressed payload still decodes to a full repaint.
    let round_trip = FrameCompressor::new().decompress(bytes).unwrap();
    assert!(round_trip.starts_with(CLEAR_SCREEN_PREFIX));
    assert!(round_trip.ends_with(&content));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn small_pane_stays_raw() {
    let content = "b".repeat(400);
    let pane = ScriptedPane::new(Some(content.as_str()));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);
    let (sink, frames) = collecting_sink();

    capture.start("s1", sink);
    sleep(Duration::from_millis(150)).await;
    capture.stop("s1");

    let snapshot = frames.lock().clone();
    assert!(!snapshot.is_empty());
    assert!(!snapshot[0].is_compressed);
    assert!(snapshot[0].compressed.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_sink_does_not_kill_the_loop() {
    let pane = ScriptedPane::new(Some("one"));
    let capture = ScreenCapture::new(pane.clone());
    fast_settings(&capture);

    let sink: FrameSink = Arc::new(|_frame| panic!("sink exploded"));
    capture.start("s1", sink);
    sleep(Duration::from_millis(100)).await;
    assert!(capture.is_capturing("s1"), "loop must survive sink panics");

    capture.close().await;
    assert!(!capture.is_capturing("s1"));
}
