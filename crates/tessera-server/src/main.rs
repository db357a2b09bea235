//! # Tessera Server
//!
//! Entry point for cluster processes. By default serves the cluster
//! manager; `--role node` serves a node agent instead.

use tessera_config::ConfigLoader;
use tessera_core::{init_telemetry, TesseraResult};
use tokio::signal;
use tracing::{error, info};

mod startup;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> TesseraResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_telemetry(&config.telemetry)?;

    info!("Starting Tessera...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    let role = role_from_args();
    match role.as_str() {
        "cluster" => startup::run_cluster_manager(config, shutdown_signal()).await,
        "node" => startup::run_node(config, shutdown_signal()).await,
        other => Err(tessera_core::TesseraError::Configuration(format!(
            "Unknown role '{}', expected 'cluster' or 'node'",
            other
        ))),
    }
}

/// `--role cluster` (default) or `--role node`.
fn role_from_args() -> String {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--role" {
            if let Some(role) = args.next() {
                return role;
            }
        }
    }
    "cluster".to_string()
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
