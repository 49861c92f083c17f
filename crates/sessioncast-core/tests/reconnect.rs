//! Reconnect schedule and circuit breaker against a dead endpoint.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::sleep;

use sessioncast_core::{
    DisconnectReason, Event, EventBus, EventKind, RelayConfig, RelayTransport, SessionCastError,
};

/// A ws:// URL nothing listens on.
async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

fn fast_config(url: &str, reconnect: bool) -> RelayConfig {
    RelayConfig::builder()
        .url(url)
        .token("agt_test")
        .machine_id("reconnect-test")
        .reconnect_enabled(reconnect)
        .reconnect_initial_delay(Duration::from_millis(100))
        .reconnect_max_delay(Duration::from_millis(1000))
        .max_reconnect_attempts(2)
        .circuit_breaker_duration(Duration::from_secs(1))
        .build()
        .unwrap()
}

fn disconnect_reasons(events: &Mutex<Vec<Event>>) -> Vec<DisconnectReason> {
    events
        .lock()
        .iter()
        .filter_map(|event| match event {
            Event::Disconnected { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_attempts_open_the_circuit_breaker() {
    let url = dead_url().await;
    let bus = Arc::new(EventBus::new());
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let collector = events.clone();
    let _sub = bus.subscribe(EventKind::Disconnected, move |event| {
        collector.lock().push(event)
    });

    let transport = RelayTransport::new(fast_config(&url, true), Arc::clone(&bus));

    // The first attempt fails immediately; attempts 2 and 3 follow at
    // ~100-125ms and ~200-250ms; the third failure trips the breaker.
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, SessionCastError::Transport(_)));

    sleep(Duration::from_millis(900)).await;
    let reasons = disconnect_reasons(&events);
    assert_eq!(
        reasons
            .iter()
            .filter(|reason| **reason == DisconnectReason::ConnectionLost)
            .count(),
        3,
        "expected three failed attempts: {reasons:?}"
    );
    assert!(
        reasons.contains(&DisconnectReason::CircuitBreaker),
        "exhaustion must surface as a circuit breaker disconnect: {reasons:?}"
    );

    // Inside the window connect() is rejected without touching the socket.
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, SessionCastError::CircuitBreaker(_)));
    assert_eq!(err.code(), "CIRCUIT_BREAKER");

    // Once the window elapses behaviour is as fresh: the socket is tried
    // (and fails) again.
    sleep(Duration::from_millis(1100)).await;
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, SessionCastError::Transport(_)));

    transport.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconnect_disabled_means_one_attempt_only() {
    let url = dead_url().await;
    let bus = Arc::new(EventBus::new());
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let collector = events.clone();
    let _sub = bus.subscribe(EventKind::Disconnected, move |event| {
        collector.lock().push(event)
    });

    let transport = RelayTransport::new(fast_config(&url, false), Arc::clone(&bus));
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, SessionCastError::Transport(_)));

    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        disconnect_reasons(&events),
        vec![DisconnectReason::ConnectionLost],
        "no retries when reconnect is disabled"
    );

    transport.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connect_failure_also_reports_a_transport_error_event() {
    let url = dead_url().await;
    let bus = Arc::new(EventBus::new());
    let codes: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let collector = codes.clone();
    let _sub = bus.subscribe(EventKind::Error, move |event| {
        if let Event::Error { code, .. } = event {
            collector.lock().push(code);
        }
    });

    let transport = RelayTransport::new(fast_config(&url, false), Arc::clone(&bus));
    let _ = transport.connect().await;
    sleep(Duration::from_millis(200)).await;

    assert_eq!(codes.lock().clone(), vec!["WS_ERROR".to_string()]);

    transport.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connect_after_local_close_is_a_quiet_no_op() {
    let url = dead_url().await;
    let bus = Arc::new(EventBus::new());
    let transport = RelayTransport::new(fast_config(&url, true), Arc::clone(&bus));

    transport.close().await;
    // A locally closed transport never dials again.
    assert!(transport.connect().await.is_ok());
    assert!(!transport.is_connected());
}
