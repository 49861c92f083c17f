//! SessionCast agent core.
//!
//! Bridges local tmux sessions to a remote relay over a single persistent
//! WebSocket connection. For every streamed session an adaptive capture
//! loop polls the pane, detects changes and ships full-repaint frames
//! upstream (gzipped when that helps); control messages from remote
//! viewers — keystrokes, resizes, session create/kill — flow back down and
//! are applied through an argv-only tmux subprocess adapter.
//!
//! [`SessionCastClient`] is the composition root; the pieces underneath
//! ([`RelayTransport`], [`ScreenCapture`], [`EventBus`], the
//! [`Multiplexer`] seam) are public so hosts can wire them differently.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod screen;
pub mod tmux;
pub mod transport;

pub use client::{SessionCastClient, SessionCastClientBuilder};
pub use config::RelayConfig;
pub use error::SessionCastError;
pub use event::{DisconnectReason, Event, EventBus, EventKind, Subscription};
pub use screen::{FrameCompressor, ScreenCapture, ScreenFrame};
pub use tmux::{Multiplexer, SpecialKey, TmuxAdapter, TmuxSession};
pub use transport::RelayTransport;

/// Milliseconds since the Unix epoch; the timestamp stamped onto frames
/// and events.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
