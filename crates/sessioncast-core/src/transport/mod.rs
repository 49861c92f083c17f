//! The persistent message tunnel to the relay.

pub mod backoff;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::SessionCastError;
use crate::event::{DisconnectReason, Event, EventBus};
use crate::now_ms;
use crate::protocol::{self, Message};

const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Phase {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closing = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            1 => Phase::Connecting,
            2 => Phase::Connected,
            3 => Phase::Closing,
            _ => Phase::Disconnected,
        }
    }
}

/// WebSocket client for the relay.
///
/// Keeps one socket open: registers on open, decodes ingress frames into
/// bus events, answers `ping` with `pong`, and pushes outbound messages
/// best-effort (disconnected sends are dropped with a warning — callers
/// own flow control). Remote closes trigger reconnect with exponential
/// backoff and jitter; once attempts are exhausted a circuit breaker
/// rejects `connect()` until its window elapses.
pub struct RelayTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: RelayConfig,
    bus: Arc<EventBus>,
    phase: AtomicU8,
    reconnect_attempts: AtomicU32,
    /// Epoch millis until which `connect()` is rejected; 0 means closed.
    circuit_open_until: AtomicU64,
    closing: AtomicBool,
    egress: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending_connects: Mutex<Vec<oneshot::Sender<Result<(), SessionCastError>>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    socket_task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayTransport {
    pub fn new(config: RelayConfig, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                phase: AtomicU8::new(Phase::Disconnected as u8),
                reconnect_attempts: AtomicU32::new(0),
                circuit_open_until: AtomicU64::new(0),
                closing: AtomicBool::new(false),
                egress: Mutex::new(None),
                pending_connects: Mutex::new(Vec::new()),
                reconnect_task: Mutex::new(None),
                socket_task: Mutex::new(None),
            }),
        }
    }

    /// Open the relay connection. Resolves once the socket is open and
    /// registration has been sent, or with the first failure. Connecting
    /// while already connected (or after a local close) resolves
    /// immediately; connecting inside the breaker window fails with
    /// [`SessionCastError::CircuitBreaker`].
    pub async fn connect(&self) -> Result<(), SessionCastError> {
        let inner = &self.inner;
        if inner.closing.load(Ordering::Acquire) || self.is_connected() {
            return Ok(());
        }

        let now = now_ms();
        let open_until = inner.circuit_open_until.load(Ordering::Acquire);
        if now < open_until {
            return Err(SessionCastError::CircuitBreaker(Duration::from_millis(
                open_until - now,
            )));
        }

        let (tx, rx) = oneshot::channel();
        inner.pending_connects.lock().push(tx);

        if inner.try_begin_connecting() {
            spawn_socket(inner);
        } else if self.is_connected() {
            // Lost the race to a concurrent opener that already finished.
            inner.complete_pending_ok();
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(SessionCastError::Transport(
                "connection attempt abandoned".into(),
            )),
        }
    }

    /// Close the socket locally. Publishes `Disconnected(Normal)` and
    /// never reconnects; the transport is done after this.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.closing.store(true, Ordering::Release);
        inner.cancel_reconnect();
        if inner.phase() == Phase::Connected {
            inner.set_phase(Phase::Closing);
        }
        inner.fail_pending("disconnected locally");

        // Dropping the egress sender makes the writer task send a Close
        // frame; the reader then winds the socket down.
        *inner.egress.lock() = None;

        let task = inner.socket_task.lock().take();
        if let Some(mut task) = task {
            if time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                warn!("socket did not close in time, aborting");
                task.abort();
            }
        }
        inner.set_phase(Phase::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.phase() == Phase::Connected
    }

    /// Best-effort send. Drops with a warning when not connected;
    /// encoding failures are logged and dropped.
    pub fn send(&self, message: Message) {
        self.inner.send(message);
    }

    /// [`disconnect`](Self::disconnect) plus reconnect-scheduler teardown.
    pub async fn close(&self) {
        self.disconnect().await;
    }
}

impl Inner {
    fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn try_begin_connecting(&self) -> bool {
        self.phase
            .compare_exchange(
                Phase::Disconnected as u8,
                Phase::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn send(&self, message: Message) {
        if self.phase() != Phase::Connected {
            warn!(kind = message.type_name(), "dropping message, not connected");
            return;
        }
        match protocol::encode(&message) {
            Ok(json) => {
                let guard = self.egress.lock();
                match guard.as_ref() {
                    // A send error here means the socket is tearing down;
                    // the reader publishes the disconnect.
                    Some(tx) => {
                        let _ = tx.send(json);
                    }
                    None => warn!(kind = message.type_name(), "dropping message, no socket"),
                }
            }
            Err(err) => error!(%err, kind = message.type_name(), "failed to encode outbound message"),
        }
    }

    fn handle_frame(&self, text: &str) {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(err) => {
                error!(%err, "failed to decode inbound frame");
                return;
            }
        };

        match message {
            Message::Keys {
                session_name,
                keys,
                enter,
            } => self.bus.publish(Event::KeysReceived {
                session: session_name,
                keys,
                press_enter: enter.unwrap_or(false),
                at: now_ms(),
            }),
            Message::Resize {
                session_name,
                cols,
                rows,
            } => self.bus.publish(Event::ResizeRequest {
                session: session_name,
                cols,
                rows,
                at: now_ms(),
            }),
            Message::CreateSession { session_name, .. } => self.bus.publish(Event::SessionCreated {
                session: session_name,
                at: now_ms(),
            }),
            Message::KillSession { session_name } => self.bus.publish(Event::SessionKilled {
                session: session_name,
                at: now_ms(),
            }),
            Message::Error { code, message } => self.bus.publish(Event::Error {
                code,
                message,
                at: now_ms(),
            }),
            Message::Ping => self.send(Message::Pong),
            other => debug!(kind = other.type_name(), "unhandled inbound message"),
        }
    }

    fn complete_pending_ok(&self) {
        for tx in self.pending_connects.lock().drain(..) {
            let _ = tx.send(Ok(()));
        }
    }

    fn fail_pending(&self, detail: &str) {
        for tx in self.pending_connects.lock().drain(..) {
            let _ = tx.send(Err(SessionCastError::Transport(detail.to_string())));
        }
    }

    fn cancel_reconnect(&self) {
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }
    }
}

fn spawn_socket(inner: &Arc<Inner>) {
    let task = tokio::spawn(run_socket(Arc::clone(inner)));
    *inner.socket_task.lock() = Some(task);
}

async fn run_socket(inner: Arc<Inner>) {
    let (socket, _) = match connect_async(inner.config.url.as_str()).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%err, url = %inner.config.url, "relay connection failed");
            inner.set_phase(Phase::Disconnected);
            inner.bus.publish(Event::Error {
                code: "WS_ERROR".into(),
                message: err.to_string(),
                at: now_ms(),
            });
            inner.fail_pending(&err.to_string());
            inner.bus.publish(Event::Disconnected {
                reason: DisconnectReason::ConnectionLost,
                detail: err.to_string(),
                at: now_ms(),
            });
            schedule_reconnect(&inner);
            return;
        }
    };

    if inner.closing.load(Ordering::Acquire) {
        // disconnect() raced the dial; drop the socket unused.
        inner.set_phase(Phase::Disconnected);
        return;
    }

    info!(url = %inner.config.url, "connected to relay");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    *inner.egress.lock() = Some(tx);

    inner.set_phase(Phase::Connected);
    inner.reconnect_attempts.store(0, Ordering::Release);
    inner.circuit_open_until.store(0, Ordering::Release);

    // Registration goes out before anything else.
    inner.send(Message::register(
        &inner.config.machine_id,
        &inner.config.label,
        &inner.config.token,
    ));
    inner.bus.publish(Event::Connected {
        machine_id: inner.config.machine_id.clone(),
        at: now_ms(),
    });
    inner.complete_pending_ok();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(WsMessage::Text(text)).await.is_err() {
                return;
            }
        }
        // Egress dropped: local close. Say goodbye properly.
        let _ = sink.send(WsMessage::Close(None)).await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => inner.handle_frame(&text),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                // Socket errors are an event, not a reconnect trigger;
                // the close underneath handles that.
                error!(%err, "relay socket error");
                inner.bus.publish(Event::Error {
                    code: "WS_ERROR".into(),
                    message: err.to_string(),
                    at: now_ms(),
                });
                break;
            }
        }
    }

    writer.abort();
    *inner.egress.lock() = None;
    let was_closing = inner.closing.load(Ordering::Acquire);
    inner.set_phase(Phase::Disconnected);

    if was_closing {
        info!("relay connection closed");
        inner.bus.publish(Event::Disconnected {
            reason: DisconnectReason::Normal,
            detail: "closed by agent".into(),
            at: now_ms(),
        });
    } else {
        warn!("relay connection lost");
        inner.bus.publish(Event::Disconnected {
            reason: DisconnectReason::ConnectionLost,
            detail: "connection lost".into(),
            at: now_ms(),
        });
        schedule_reconnect(&inner);
    }
}

fn schedule_reconnect(inner: &Arc<Inner>) {
    if !inner.config.reconnect_enabled || inner.closing.load(Ordering::Acquire) {
        return;
    }

    let attempts = inner.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
    if attempts > inner.config.max_reconnect_attempts {
        let window = inner.config.circuit_breaker_duration;
        inner
            .circuit_open_until
            .store(now_ms() + window.as_millis() as u64, Ordering::Release);
        inner.reconnect_attempts.store(0, Ordering::Release);
        warn!(?window, "reconnect attempts exhausted, circuit breaker open");
        inner.bus.publish(Event::Disconnected {
            reason: DisconnectReason::CircuitBreaker,
            detail: format!("circuit breaker open for {}s", window.as_secs()),
            at: now_ms(),
        });
        return;
    }

    let delay = backoff::with_jitter(backoff::backoff_delay(
        attempts,
        inner.config.reconnect_initial_delay,
        inner.config.reconnect_max_delay,
    ));
    info!(attempt = attempts, ?delay, "scheduling reconnect");

    let worker = Arc::clone(inner);
    let task = tokio::spawn(async move {
        time::sleep(delay).await;
        if !worker.closing.load(Ordering::Acquire) && worker.try_begin_connecting() {
            spawn_socket(&worker);
        }
    });

    // Only one reconnect is ever in flight; replacing the slot drops the
    // previous, already-finished handle.
    if let Some(previous) = inner.reconnect_task.lock().replace(task) {
        if !previous.is_finished() {
            previous.abort();
        }
    }
}
