//! The seam to the external terminal multiplexer.

pub mod adapter;
pub mod keys;

pub use adapter::TmuxAdapter;
pub use keys::SpecialKey;

use async_trait::async_trait;

/// Clear screen + cursor home, prefixed to every streamed frame so each
/// one is a complete repaint.
pub const CLEAR_SCREEN_PREFIX: &str = "\u{1b}[2J\u{1b}[H";

/// One local multiplexer session as reported by `tmux ls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSession {
    pub name: String,
    pub windows: u32,
    pub attached: bool,
}

impl TmuxSession {
    /// Parse one `tmux ls` line of the shape
    /// `main: 3 windows (created Mon Jan 26 19:54:13 2026) (attached)`.
    ///
    /// The name is everything before the first `:`; the window count
    /// defaults to 1 when absent or unparsable; a line that does not
    /// parse at all still yields a minimal record rather than being
    /// dropped. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<TmuxSession> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(colon) = line.find(':') else {
            return Some(TmuxSession {
                name: line.to_string(),
                windows: 1,
                attached: false,
            });
        };

        let name = line[..colon].trim().to_string();
        let rest = &line[colon + 1..];
        let windows = rest
            .find(" windows")
            .or_else(|| rest.find(" window"))
            .and_then(|idx| rest[..idx].trim().parse().ok())
            .unwrap_or(1);
        let attached = line.contains("(attached)");

        Some(TmuxSession {
            name,
            windows,
            attached,
        })
    }
}

/// Operations the agent needs from the multiplexer.
///
/// The production implementation is [`TmuxAdapter`], which shells out to
/// the tmux binary; tests substitute their own. Every operation absorbs
/// subprocess failure: a timeout or broken invocation yields a `None` or
/// a silent no-op, never an error the capture loop could trip over.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn list_sessions(&self) -> Vec<TmuxSession>;

    async fn session_exists(&self, name: &str) -> bool;

    /// Create a detached session. Creating a session that already exists
    /// is a no-op that logs a warning.
    async fn create_session(&self, name: &str, work_dir: Option<&str>);

    async fn kill_session(&self, name: &str);

    /// `literal` maps to `send-keys -l`, so the text is typed verbatim
    /// rather than interpreted as key names.
    async fn send_keys(&self, target: &str, keys: &str, literal: bool);

    async fn send_special_key(&self, target: &str, key: SpecialKey);

    async fn send_keys_with_enter(&self, target: &str, keys: &str) {
        self.send_keys(target, keys, true).await;
        self.send_special_key(target, SpecialKey::Enter).await;
    }

    /// Snapshot the pane, optionally with ANSI escape sequences.
    async fn capture_pane(&self, name: &str, with_escapes: bool) -> Option<String>;

    /// [`capture_pane`](Self::capture_pane) with escapes, prefixed with
    /// [`CLEAR_SCREEN_PREFIX`] so the frame repaints the whole viewer.
    async fn capture_pane_for_stream(&self, name: &str) -> Option<String> {
        self.capture_pane(name, true)
            .await
            .map(|content| format!("{CLEAR_SCREEN_PREFIX}{content}"))
    }

    async fn resize_window(&self, name: &str, cols: u16, rows: u16);

    async fn pane_work_dir(&self, name: &str) -> Option<String>;
}
