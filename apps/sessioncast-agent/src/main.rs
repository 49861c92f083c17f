mod cli;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use crate::cli::Cli;
use sessioncast_core::{DisconnectReason, SessionCastClient};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut builder = SessionCastClient::builder()
        .relay(cli.relay_url.clone())
        .token(cli.token)
        .machine_id(cli.machine_id.clone())
        .reconnect(!cli.no_reconnect)
        .reconnect_delay(
            Duration::from_millis(cli.reconnect_initial_delay_ms),
            Duration::from_millis(cli.reconnect_max_delay_ms),
        )
        .max_reconnect_attempts(cli.reconnect_max_attempts)
        .circuit_breaker_duration(Duration::from_secs(cli.circuit_breaker_secs))
        .auto_stream_on_create(!cli.no_auto_stream);
    if let Some(label) = cli.label {
        builder = builder.label(label);
    }
    let client = builder.build()?;

    let _disconnect_log = client.on_disconnect(|reason| {
        if reason != DisconnectReason::Normal {
            warn!(?reason, "disconnected from relay");
        }
    });

    if !cli.no_auto_connect {
        info!(url = %cli.relay_url, machine_id = %cli.machine_id, "connecting to relay");
        client.connect().await?;
    }

    // Pick up whatever is already running on this host.
    let sessions = client.list_sessions().await;
    if !cli.no_auto_stream {
        for session in &sessions {
            client.start_streaming(&session.name);
        }
    }
    client.publish_sessions().await;
    info!(sessions = sessions.len(), "agent running, ctrl-c to exit");

    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    client.close().await;
    Ok(())
}
