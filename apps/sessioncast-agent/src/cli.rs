use clap::Parser;

/// SessionCast host agent: streams local tmux sessions to a relay and
/// applies remote control messages.
#[derive(Parser, Debug)]
#[command(name = "sessioncast-agent")]
#[command(about = "Bridge local tmux sessions to a SessionCast relay")]
pub struct Cli {
    /// Relay WebSocket URL.
    #[arg(
        long,
        env = "SESSIONCAST_RELAY_URL",
        default_value = "wss://relay.sessioncast.io/ws"
    )]
    pub relay_url: String,

    /// Relay authentication token.
    #[arg(long, env = "SESSIONCAST_TOKEN")]
    pub token: String,

    /// Unique identifier for this machine.
    #[arg(long, env = "SESSIONCAST_MACHINE_ID")]
    pub machine_id: String,

    /// Human-readable label shown to viewers; defaults to the machine id.
    #[arg(long, env = "SESSIONCAST_LABEL")]
    pub label: Option<String>,

    /// Do not connect to the relay on startup.
    #[arg(long, env = "SESSIONCAST_NO_AUTO_CONNECT")]
    pub no_auto_connect: bool,

    /// Do not stream sessions automatically (existing ones at startup,
    /// new ones on create).
    #[arg(long, env = "SESSIONCAST_NO_AUTO_STREAM")]
    pub no_auto_stream: bool,

    /// Disable reconnect after connection loss.
    #[arg(long, env = "SESSIONCAST_NO_RECONNECT")]
    pub no_reconnect: bool,

    /// Initial reconnect delay in milliseconds.
    #[arg(
        long,
        env = "SESSIONCAST_RECONNECT_INITIAL_DELAY_MS",
        default_value_t = 2000
    )]
    pub reconnect_initial_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[arg(
        long,
        env = "SESSIONCAST_RECONNECT_MAX_DELAY_MS",
        default_value_t = 60_000
    )]
    pub reconnect_max_delay_ms: u64,

    /// Reconnect attempts tolerated before the circuit breaker opens.
    #[arg(long, env = "SESSIONCAST_RECONNECT_MAX_ATTEMPTS", default_value_t = 5)]
    pub reconnect_max_attempts: u32,

    /// Circuit breaker window in seconds.
    #[arg(long, env = "SESSIONCAST_CIRCUIT_BREAKER_SECS", default_value_t = 120)]
    pub circuit_breaker_secs: u64,
}
