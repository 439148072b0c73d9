//! portmux: one port, every protocol.
//!
//! ```text
//!  client ──▶ listener ──▶ sniff ──┬─ HTTP/1.1 ──┬─ POST/PUT body ─▶ framer ─┐
//!                                  │             └─ Upgrade ─▶ WebSocket ────┤
//!                                  ├─ TLS ─▶ rustls ─▶ HTTP/1.1              ├─▶ Handler
//!                                  ├─ raw bytes ─▶ framer ───────────────────┘
//!                                  └─ SSLv2 / unknown ─▶ client error
//! ```
//!
//! The binary runs a logging echo server: every message is logged and sent
//! back on the transport it arrived on.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;

use portmux::config::{load_config, validate_config, ServerConfig};
use portmux::lifecycle::signals::forward_signals;
use portmux::net::listener::Listener;
use portmux::observability::{logging, metrics};
use portmux::{ClientSocket, Handler, ResponseWriter, Server, Shutdown};

#[derive(Parser)]
#[command(name = "portmux")]
#[command(about = "Serve HTTP, TLS, WebSocket and raw messages on a single port", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override observability.log_level
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Logs each message and echoes it back.
struct EchoHandler;

impl Handler for EchoHandler {
    fn on_connect(&self, writer: &ResponseWriter, socket: &ClientSocket) {
        tracing::info!(
            connection_id = %socket.id(),
            peer_addr = ?socket.peer_addr(),
            transport = writer.transport().as_str(),
            resolved = %socket.resolved_type(),
            "Client connected"
        );
    }

    fn on_message(&self, data: Bytes, writer: &ResponseWriter, socket: &ClientSocket) {
        tracing::info!(
            connection_id = %socket.id(),
            bytes = data.len(),
            message = %String::from_utf8_lossy(&data),
            "Message received"
        );
        let _ = writer.write(data);
    }

    fn on_disconnect(&self, socket: &ClientSocket) {
        tracing::info!(connection_id = %socket.id(), "Client disconnected");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "portmux starting");

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        classify_ms = config.timeouts.classify_ms,
        read_secs = config.timeouts.read_secs,
        raw_fallback = config.protocol.raw_fallback,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = Server::from_config(&config, EchoHandler).await?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(forward_signals(shutdown));

    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    server.run(listener, shutdown_rx, grace).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
