use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the agent core.
///
/// Subprocess timeouts and non-zero exits are deliberately absent: the
/// tmux adapter absorbs them into `None` results so a flaky tmux can
/// never wedge a capture loop.
#[derive(Debug, Error)]
pub enum SessionCastError {
    /// Missing or empty required configuration; fatal at construction.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Socket-level failure. Surfaced as an `Error` event, never fatal.
    #[error("transport error: {0}")]
    Transport(String),

    /// `connect()` was called while the circuit breaker window is open.
    #[error("circuit breaker open, retry in {}ms", .0.as_millis())]
    CircuitBreaker(Duration),

    /// An inbound frame failed to decode; logged and dropped.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// An outbound message failed to encode; logged and dropped.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl SessionCastError {
    /// Stable string code carried on `Event::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "CONFIG_INVALID",
            Self::Transport(_) => "WS_ERROR",
            Self::CircuitBreaker(_) => "CIRCUIT_BREAKER",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Encode(_) => "ENCODE_ERROR",
        }
    }
}
