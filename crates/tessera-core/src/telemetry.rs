//! Tracing initialization for cluster processes.

use crate::TesseraResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter when `RUST_LOG` is unset (e.g. "info,tessera=debug").
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit logs as JSON instead of human-readable lines.
    #[serde(default)]
    pub json_output: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json_output: false,
        }
    }
}

/// Initialize the tracing subscriber for this process.
///
/// `RUST_LOG` overrides the configured filter. Safe to call once per
/// process; subsequent calls return an error from the subscriber and are
/// reported as `Ok` so tests can initialize lazily.
pub fn init_telemetry(config: &TelemetryConfig) -> TesseraResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));

    let result = if config.json_output {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }

    Ok(())
}
