//! # Tessera Config
//!
//! Layered configuration loading for cluster processes. Configuration is
//! assembled from `config/default.toml`, an environment-specific file
//! selected by `TESSERA_ENVIRONMENT`, an uncommitted `local.toml`, and
//! finally `TESSERA_`-prefixed environment variables.

pub mod app_config;
pub mod loader;

pub use app_config::*;
pub use loader::ConfigLoader;
