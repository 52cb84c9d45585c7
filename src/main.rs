//! # relay
//!
//! WebSocket relay binary: loads settings, installs logging and serves until
//! Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::{LogFormat, RelaySettings};
use relay_telemetry::TelemetryConfig;

/// WebSocket relay: every message is forwarded to all other connected clients.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Cli {
    /// JSON settings file. Missing files fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Default log filter, e.g. `info` or `relay_core=debug,info`.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format (`pretty` or `json`).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Flags win over the file and environment.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings =
        relay_settings::load_settings(args.config.as_deref()).context("Failed to load settings")?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    relay_telemetry::init_telemetry(&TelemetryConfig {
        log_level: settings.logging.level.clone(),
        json: settings.logging.format == LogFormat::Json,
    })
    .context("Failed to initialise logging")?;

    let config = ServerConfig::from(&settings.server);
    let shutdown_timeout = config.shutdown_timeout();
    let server = RelayServer::new(config);

    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind relay on {}", settings.bind_addr()))?;

    tracing::info!("relay listening on ws://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(shutdown_timeout))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
