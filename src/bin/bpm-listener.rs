//! # BPM Listener
//!
//! Long-running worker: consumes the input queue and correlates every
//! event with the process engine until Ctrl-C or SIGTERM.

use anyhow::Context;
use bpm_bridge::config::loader::sanitize_config_for_logging;
use bpm_bridge::logging::init_structured_logging;
use bpm_bridge::{BridgeSystem, ConfigLoader};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "bpm-listener")]
#[command(about = "Correlate RabbitMQ task events with Camunda process instances")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: config/bpm-bridge.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding bpm-bridge.toml and bpm-bridge.{env}.toml
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Validate the configuration, print it with credentials masked and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let mut loader = ConfigLoader::new();
    if let Some(dir) = cli.config_dir {
        loader = loader.config_directory(dir);
    }
    if let Some(file) = cli.config {
        loader = loader.config_file(file);
    }

    let config = loader.load().context("failed to load configuration")?;
    let sanitized = sanitize_config_for_logging(&config);

    if cli.check {
        println!("{}", serde_json::to_string_pretty(&sanitized)?);
        return Ok(());
    }
    debug!(config = %sanitized, environment = %loader.environment(), "Configuration loaded");

    let system = BridgeSystem::from_config(config).context("failed to build bridge")?;
    let stats = system.run_until_shutdown(shutdown_signal()).await;

    info!(
        received = stats.deliveries_received,
        correlated = stats.correlated,
        failures = stats.correlation_failures,
        reconnects = stats.reconnects,
        "bpm-listener stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}
