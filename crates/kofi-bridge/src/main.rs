//! # kofi-bridge
//!
//! Ko-fi bridge server binary: loads settings, initializes logging and
//! metrics, and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use kofi_bridge_core::logging::{LogFormat, init_subscriber};
use kofi_bridge_server::{BridgeServer, ServerConfig};
use kofi_bridge_settings::{BridgeSettings, load_settings_from_path, settings_path};
use tracing::{info, warn};

/// Ko-fi webhook to WebSocket bridge.
#[derive(Parser, Debug)]
#[command(name = "kofi-bridge", version, about = "Relay Ko-fi webhooks to WebSocket subscribers")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.kofi-bridge/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `kofi_bridge_core=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut BridgeSettings) {
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
    }
}

/// Defaults → settings file → `KOFI_BRIDGE_*` env → CLI flags.
fn resolve_settings(cli: &Cli) -> Result<BridgeSettings> {
    let path = match &cli.config {
        Some(path) => {
            ensure!(path.exists(), "config file not found: {}", path.display());
            path.clone()
        }
        None => settings_path(),
    };
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let config = ServerConfig::from(&settings);
    let mut server = BridgeServer::new(config);
    match kofi_bridge_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let (addr, handle) = server.listen().await.with_context(|| {
        format!(
            "Failed to bind {}:{}",
            settings.server.host, settings.server.port
        )
    })?;
    info!(
        %addr,
        version = env!("CARGO_PKG_VERSION"),
        max_attempts = settings.delivery.max_attempts,
        backoff_ms = settings.delivery.backoff_ms,
        "kofi bridge started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    server.shutdown().graceful_shutdown(Some(handle), None).await;
    Ok(())
}
