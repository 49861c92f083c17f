//! Events flowing between the transport, the capture engine and
//! user-supplied handlers.

pub mod bus;

pub use bus::{EventBus, Subscription};

use crate::screen::ScreenFrame;

/// Why the relay connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed by this agent.
    Normal,
    /// The relay or the network dropped us.
    ConnectionLost,
    AuthFailed,
    /// Reconnect attempts were exhausted; the breaker window is open.
    CircuitBreaker,
    ServerError,
}

/// The closed set of events published on the [`EventBus`].
///
/// `at` is milliseconds since the Unix epoch, stamped locally when the
/// event is created — timestamps never travel on the wire.
#[derive(Debug, Clone)]
pub enum Event {
    Connected {
        machine_id: String,
        at: u64,
    },
    Disconnected {
        reason: DisconnectReason,
        detail: String,
        at: u64,
    },
    /// A frame left the capture engine for this session.
    Screen {
        session: String,
        frame: ScreenFrame,
        at: u64,
    },
    /// A remote viewer typed into this session.
    KeysReceived {
        session: String,
        keys: String,
        press_enter: bool,
        at: u64,
    },
    SessionCreated {
        session: String,
        at: u64,
    },
    SessionKilled {
        session: String,
        at: u64,
    },
    ResizeRequest {
        session: String,
        cols: u16,
        rows: u16,
        at: u64,
    },
    Error {
        code: String,
        message: String,
        at: u64,
    },
}

/// Subscription key: one entry per [`Event`] variant plus [`Any`], the
/// union root that sees everything.
///
/// [`Any`]: EventKind::Any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Screen,
    KeysReceived,
    SessionCreated,
    SessionKilled,
    ResizeRequest,
    Error,
    Any,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected { .. } => EventKind::Connected,
            Event::Disconnected { .. } => EventKind::Disconnected,
            Event::Screen { .. } => EventKind::Screen,
            Event::KeysReceived { .. } => EventKind::KeysReceived,
            Event::SessionCreated { .. } => EventKind::SessionCreated,
            Event::SessionKilled { .. } => EventKind::SessionKilled,
            Event::ResizeRequest { .. } => EventKind::ResizeRequest,
            Event::Error { .. } => EventKind::Error,
        }
    }

    pub fn at(&self) -> u64 {
        match self {
            Event::Connected { at, .. }
            | Event::Disconnected { at, .. }
            | Event::Screen { at, .. }
            | Event::KeysReceived { at, .. }
            | Event::SessionCreated { at, .. }
            | Event::SessionKilled { at, .. }
            | Event::ResizeRequest { at, .. }
            | Event::Error { at, .. } => *at,
        }
    }
}
