//! The composition root tying adapter, capture engine, transport and bus
//! together.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::{RelayConfig, RelayConfigBuilder};
use crate::error::SessionCastError;
use crate::event::{DisconnectReason, Event, EventBus, EventKind, Subscription};
use crate::now_ms;
use crate::protocol::{Message, SessionInfo};
use crate::screen::{CaptureSettings, FrameCompressor, FrameSink, ScreenCapture, ScreenFrame};
use crate::tmux::{Multiplexer, SpecialKey, TmuxAdapter, TmuxSession};
use crate::transport::RelayTransport;

/// One agent process, one relay connection, N streamed sessions.
///
/// ```no_run
/// use sessioncast_core::SessionCastClient;
///
/// async fn run() -> Result<(), sessioncast_core::SessionCastError> {
///     let client = SessionCastClient::builder()
///         .relay("wss://relay.sessioncast.io/ws")
///         .token("agt_xxx")
///         .machine_id("my-machine")
///         .build()?;
///
///     client.connect().await?;
///     client.create_session("demo", Some("/tmp")).await;
///     client.send_keys("demo", "echo hello", true).await;
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct SessionCastClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    bus: Arc<EventBus>,
    tmux: Arc<dyn Multiplexer>,
    capture: Arc<ScreenCapture>,
    transport: Arc<RelayTransport>,
    /// Sessions currently streaming; the per-session capture task is
    /// owned by the engine, this is the controller's view of it.
    streaming: DashMap<String, ()>,
    auto_stream_on_create: bool,
}

impl SessionCastClient {
    pub fn builder() -> SessionCastClientBuilder {
        SessionCastClientBuilder::default()
    }

    // ---- connection ----

    pub async fn connect(&self) -> Result<(), SessionCastError> {
        self.inner.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.inner.transport.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    // ---- session management ----

    pub async fn list_sessions(&self) -> Vec<TmuxSession> {
        self.inner.tmux.list_sessions().await
    }

    pub async fn session_exists(&self, session: &str) -> bool {
        self.inner.tmux.session_exists(session).await
    }

    /// Create a tmux session (idempotent at the adapter) and publish
    /// `SessionCreated`. Starts streaming when the client was built with
    /// `auto_stream_on_create`.
    pub async fn create_session(&self, session: &str, work_dir: Option<&str>) {
        self.inner.tmux.create_session(session, work_dir).await;
        if self.inner.auto_stream_on_create {
            self.inner.start_streaming(session);
        }
        self.inner.bus.publish(Event::SessionCreated {
            session: session.to_string(),
            at: now_ms(),
        });
    }

    /// Stop streaming, kill the tmux session and publish `SessionKilled`.
    pub async fn kill_session(&self, session: &str) {
        self.inner.stop_streaming(session);
        self.inner.tmux.kill_session(session).await;
        self.inner.bus.publish(Event::SessionKilled {
            session: session.to_string(),
            at: now_ms(),
        });
    }

    /// Send the current session inventory to the relay.
    pub async fn publish_sessions(&self) {
        let sessions: Vec<SessionInfo> = self
            .inner
            .tmux
            .list_sessions()
            .await
            .into_iter()
            .map(|session| SessionInfo {
                name: session.name,
                windows: session.windows,
                attached: session.attached,
            })
            .collect();
        self.inner.transport.send(Message::Sessions { sessions });
    }

    // ---- key input ----

    /// Type `keys` into `session`; with `enter` a newline follows.
    pub async fn send_keys(&self, session: &str, keys: &str, enter: bool) {
        if enter {
            self.inner.tmux.send_keys_with_enter(session, keys).await;
        } else {
            self.inner.tmux.send_keys(session, keys, true).await;
        }
    }

    pub async fn send_special_key(&self, session: &str, key: SpecialKey) {
        self.inner.tmux.send_special_key(session, key).await;
    }

    // ---- streaming ----

    pub fn start_streaming(&self, session: &str) {
        self.inner.start_streaming(session);
    }

    /// Idempotent; unknown sessions are ignored.
    pub fn stop_streaming(&self, session: &str) {
        self.inner.stop_streaming(session);
    }

    pub fn is_streaming(&self, session: &str) -> bool {
        self.inner.streaming.contains_key(session)
    }

    /// Live capture tunables (polling intervals, idle threshold,
    /// force-send interval).
    pub fn capture_settings(&self) -> &CaptureSettings {
        self.inner.capture.settings()
    }

    // ---- event subscription ----

    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(Event) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(kind, handler)
    }

    pub fn subscribe_all(&self, handler: impl Fn(Event) + Send + Sync + 'static) -> Subscription {
        self.inner.bus.subscribe_all(handler)
    }

    pub fn on_connect(&self, handler: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.bus.subscribe(EventKind::Connected, move |_| handler())
    }

    pub fn on_disconnect(
        &self,
        handler: impl Fn(DisconnectReason) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(EventKind::Disconnected, move |event| {
            if let Event::Disconnected { reason, .. } = event {
                handler(reason);
            }
        })
    }

    pub fn on_error(
        &self,
        handler: impl Fn(String, String) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(EventKind::Error, move |event| {
            if let Event::Error { code, message, .. } = event {
                handler(code, message);
            }
        })
    }

    pub fn on_keys_received(
        &self,
        handler: impl Fn(String, String, bool) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(EventKind::KeysReceived, move |event| {
            if let Event::KeysReceived {
                session,
                keys,
                press_enter,
                ..
            } = event
            {
                handler(session, keys, press_enter);
            }
        })
    }

    /// Frames for one session.
    pub fn on_screen(
        &self,
        session: &str,
        handler: impl Fn(ScreenFrame) + Send + Sync + 'static,
    ) -> Subscription {
        let session = session.to_string();
        self.inner.bus.subscribe(EventKind::Screen, move |event| {
            if let Event::Screen {
                session: frame_session,
                frame,
                ..
            } = event
            {
                if frame_session == session {
                    handler(frame);
                }
            }
        })
    }

    /// Frames for every streamed session.
    pub fn on_screen_all(
        &self,
        handler: impl Fn(ScreenFrame) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(EventKind::Screen, move |event| {
            if let Event::Screen { frame, .. } = event {
                handler(frame);
            }
        })
    }

    // ---- shutdown ----

    /// Release everything in reverse construction order: streams, then
    /// the capture engine, then the transport, then the bus.
    pub async fn close(&self) {
        let sessions: Vec<String> = self
            .inner
            .streaming
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for session in sessions {
            self.inner.stop_streaming(&session);
        }
        self.inner.capture.close().await;
        self.inner.transport.close().await;
        self.inner.bus.close();
        info!("client closed");
    }
}

impl ClientInner {
    fn start_streaming(&self, session: &str) {
        if self.streaming.contains_key(session) {
            return;
        }

        let transport = Arc::clone(&self.transport);
        let bus = Arc::clone(&self.bus);
        let sink: FrameSink = Arc::new(move |frame: ScreenFrame| {
            if transport.is_connected() {
                let payload = frame.base64_payload();
                let message = if frame.is_compressed {
                    Message::ScreenGz {
                        session_name: frame.session.clone(),
                        screen: payload,
                    }
                } else {
                    Message::Screen {
                        session_name: frame.session.clone(),
                        screen: payload,
                    }
                };
                transport.send(message);
            }
            bus.publish(Event::Screen {
                session: frame.session.clone(),
                frame,
                at: now_ms(),
            });
        });

        self.capture.start(session, sink);
        self.streaming.insert(session.to_string(), ());
        info!(session, "started streaming");
    }

    fn stop_streaming(&self, session: &str) {
        if self.streaming.remove(session).is_some() {
            self.capture.stop(session);
            info!(session, "stopped streaming");
        }
    }
}

/// Wire the control-message handlers. Handlers hold a `Weak` back-edge
/// where they need the whole client, so the bus never keeps the client
/// alive on its own.
fn wire_handlers(inner: &Arc<ClientInner>) {
    {
        let tmux = Arc::clone(&inner.tmux);
        inner.bus.subscribe(EventKind::KeysReceived, move |event| {
            if let Event::KeysReceived {
                session,
                keys,
                press_enter,
                ..
            } = event
            {
                debug!(%session, press_enter, "applying remote keys");
                let tmux = Arc::clone(&tmux);
                tokio::spawn(async move {
                    if press_enter {
                        tmux.send_keys_with_enter(&session, &keys).await;
                    } else {
                        tmux.send_keys(&session, &keys, true).await;
                    }
                });
            }
        });
    }

    {
        let tmux = Arc::clone(&inner.tmux);
        inner.bus.subscribe(EventKind::ResizeRequest, move |event| {
            if let Event::ResizeRequest {
                session, cols, rows, ..
            } = event
            {
                debug!(%session, cols, rows, "applying resize");
                let tmux = Arc::clone(&tmux);
                tokio::spawn(async move {
                    tmux.resize_window(&session, cols, rows).await;
                });
            }
        });
    }

    {
        let weak: Weak<ClientInner> = Arc::downgrade(inner);
        inner.bus.subscribe(EventKind::SessionCreated, move |event| {
            if let Event::SessionCreated { session, .. } = event {
                let Some(inner) = weak.upgrade() else { return };
                tokio::spawn(async move {
                    // Relay-initiated creates arrive here with no local
                    // session yet; the adapter call is a warning no-op
                    // when it already exists.
                    inner.tmux.create_session(&session, None).await;
                    if inner.transport.is_connected() && !inner.streaming.contains_key(&session) {
                        inner.start_streaming(&session);
                    }
                });
            }
        });
    }

    {
        let weak: Weak<ClientInner> = Arc::downgrade(inner);
        inner.bus.subscribe(EventKind::SessionKilled, move |event| {
            if let Event::SessionKilled { session, .. } = event {
                let Some(inner) = weak.upgrade() else { return };
                inner.stop_streaming(&session);
                let tmux = Arc::clone(&inner.tmux);
                tokio::spawn(async move {
                    tmux.kill_session(&session).await;
                });
            }
        });
    }
}

/// Builder mirroring the relay configuration plus the controller knobs.
pub struct SessionCastClientBuilder {
    config: RelayConfigBuilder,
    auto_stream_on_create: bool,
    multiplexer: Option<Arc<dyn Multiplexer>>,
    compressor: FrameCompressor,
}

impl Default for SessionCastClientBuilder {
    fn default() -> Self {
        Self {
            config: RelayConfig::builder(),
            auto_stream_on_create: true,
            multiplexer: None,
            compressor: FrameCompressor::new(),
        }
    }
}

impl SessionCastClientBuilder {
    pub fn relay(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.url(url);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config = self.config.token(token);
        self
    }

    pub fn machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.config = self.config.machine_id(machine_id);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config = self.config.label(label);
        self
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config = self.config.reconnect_enabled(enabled);
        self
    }

    pub fn reconnect_delay(
        mut self,
        initial: std::time::Duration,
        max: std::time::Duration,
    ) -> Self {
        self.config = self
            .config
            .reconnect_initial_delay(initial)
            .reconnect_max_delay(max);
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config = self.config.max_reconnect_attempts(attempts);
        self
    }

    pub fn circuit_breaker_duration(mut self, duration: std::time::Duration) -> Self {
        self.config = self.config.circuit_breaker_duration(duration);
        self
    }

    pub fn auto_stream_on_create(mut self, enabled: bool) -> Self {
        self.auto_stream_on_create = enabled;
        self
    }

    /// Substitute the multiplexer seam; tests use this to avoid spawning
    /// a real tmux.
    pub fn multiplexer(mut self, multiplexer: Arc<dyn Multiplexer>) -> Self {
        self.multiplexer = Some(multiplexer);
        self
    }

    pub fn compressor(mut self, compressor: FrameCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Fails with [`SessionCastError::ConfigInvalid`] when the token or
    /// machine id is missing.
    pub fn build(self) -> Result<SessionCastClient, SessionCastError> {
        let config = self.config.build()?;
        let bus = Arc::new(EventBus::new());
        let tmux: Arc<dyn Multiplexer> = self
            .multiplexer
            .unwrap_or_else(|| Arc::new(TmuxAdapter::new()));
        let capture = Arc::new(ScreenCapture::with_compressor(
            Arc::clone(&tmux),
            self.compressor,
        ));
        let transport = Arc::new(RelayTransport::new(config, Arc::clone(&bus)));

        let inner = Arc::new(ClientInner {
            bus,
            tmux,
            capture,
            transport,
            streaming: DashMap::new(),
            auto_stream_on_create: self.auto_stream_on_create,
        });
        wire_handlers(&inner);

        Ok(SessionCastClient { inner })
    }
}
