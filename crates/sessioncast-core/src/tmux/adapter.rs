use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, info, warn};

use super::keys::SpecialKey;
use super::{Multiplexer, TmuxSession};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the tmux binary through argv-only subprocess calls.
///
/// No shell is ever involved: arguments — including user-supplied key
/// text — go straight into the argv vector, so nothing needs quoting or
/// filtering. Each invocation is bounded by a wall-clock timeout; on
/// timeout the child is killed and the operation yields `None`.
pub struct TmuxAdapter {
    tmux_path: String,
    timeout: Duration,
}

impl Default for TmuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxAdapter {
    pub fn new() -> Self {
        Self::with_binary("tmux")
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            tmux_path: path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run tmux with the given argv and return its combined output,
    /// stderr folded in after stdout. tmux's own diagnostics (`can't
    /// find session`, `no server running`) come back as output for
    /// callers that inspect them; only a timeout, a spawn failure or an
    /// I/O error yields `None`.
    async fn run(&self, args: &[&str]) -> Option<String> {
        let mut command = Command::new(&self.tmux_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(%err, ?args, "tmux invocation failed");
                return None;
            }
            Err(_) => {
                warn!(?args, timeout = ?self.timeout, "tmux invocation timed out");
                return None;
            }
        };

        if !output.status.success() {
            debug!(?args, status = ?output.status, "tmux exited non-zero");
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Some(text.trim().to_string())
    }
}

#[async_trait]
impl Multiplexer for TmuxAdapter {
    async fn list_sessions(&self) -> Vec<TmuxSession> {
        let Some(output) = self.run(&["ls"]).await else {
            return Vec::new();
        };
        if output.is_empty() || output.contains("no server running") {
            return Vec::new();
        }
        output.lines().filter_map(TmuxSession::parse).collect()
    }

    async fn session_exists(&self, name: &str) -> bool {
        match self.run(&["has-session", "-t", name]).await {
            Some(output) => !output.contains("can't find session"),
            None => false,
        }
    }

    async fn create_session(&self, name: &str, work_dir: Option<&str>) {
        if self.session_exists(name).await {
            warn!(session = name, "session already exists");
            return;
        }

        let mut args = vec!["new-session", "-d", "-s", name];
        if let Some(dir) = work_dir.filter(|dir| !dir.trim().is_empty()) {
            args.push("-c");
            args.push(dir);
        }
        self.run(&args).await;
        info!(session = name, "created session");
    }

    async fn kill_session(&self, name: &str) {
        self.run(&["kill-session", "-t", name]).await;
        info!(session = name, "killed session");
    }

    async fn send_keys(&self, target: &str, keys: &str, literal: bool) {
        if keys.is_empty() {
            return;
        }
        let mut args = vec!["send-keys", "-t", target];
        if literal {
            args.push("-l");
        }
        args.push(keys);
        self.run(&args).await;
    }

    async fn send_special_key(&self, target: &str, key: SpecialKey) {
        self.run(&["send-keys", "-t", target, key.token()]).await;
    }

    async fn capture_pane(&self, name: &str, with_escapes: bool) -> Option<String> {
        let mut args = vec!["capture-pane", "-t", name, "-p"];
        if with_escapes {
            args.push("-e");
            args.push("-N");
        }
        self.run(&args).await
    }

    async fn resize_window(&self, name: &str, cols: u16, rows: u16) {
        let cols = cols.to_string();
        let rows = rows.to_string();
        self.run(&["resize-window", "-t", name, "-x", &cols, "-y", &rows])
            .await;
    }

    async fn pane_work_dir(&self, name: &str) -> Option<String> {
        self.run(&["display-message", "-t", name, "-p", "#{pane_current_path}"])
            .await
            .map(|output| output.trim().to_string())
            .filter(|output| !output.is_empty())
    }
}
