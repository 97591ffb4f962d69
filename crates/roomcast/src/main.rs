//! # roomcast
//!
//! Relay server binary: loads settings, installs logging and metrics, and
//! serves rooms until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use roomcast_logging::LogFormat;
use roomcast_server::{RelayServer, ServerConfig};
use roomcast_settings::RoomcastSettings;

/// How long to wait for the listener and reaper after ctrl-c.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket room relay.
#[derive(Parser, Debug)]
#[command(name = "roomcast", about = "WebSocket room relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `$ROOMCAST_SETTINGS` or
    /// `~/.roomcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `roomcast_server=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// Do not install the Prometheus recorder.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    /// Load settings from the chosen file and fold the flags over them.
    fn resolve_settings(&self) -> Result<RoomcastSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(roomcast_settings::settings_path);
        let mut settings =
            roomcast_settings::load_settings_from_path(&path).map_err(|error| {
                let context = format!(
                    "Failed to load settings from {} ({})",
                    path.display(),
                    error.error_kind()
                );
                anyhow::Error::new(error).context(context)
            })?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    roomcast_logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    )
    .context("Failed to initialize logging")?;

    let mut server = RelayServer::new(ServerConfig::from(&settings));
    if !args.no_metrics {
        let handle = roomcast_server::metrics::install_recorder()
            .context("Failed to install metrics recorder")?;
        server = server.with_prometheus(handle);
    }

    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        addr = %handle.addr(),
        default_capacity = settings.rooms.default_capacity,
        ttl_secs = settings.rooms.ttl_secs,
        "roomcast ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(handle.into_tasks(), Some(SHUTDOWN_TIMEOUT))
        .await;
    Ok(())
}
