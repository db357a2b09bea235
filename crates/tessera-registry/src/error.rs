//! Registry error types.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry-related errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No object stored under this key.
    #[error("No object stored under key '{0}'")]
    KeyNotFound(String),

    /// The key exists but the requested version does not.
    #[error("Version {version} of key '{key}' not found")]
    VersionNotFound { key: String, version: u64 },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed store contents.
    #[error("Corrupt store entry: {0}")]
    Corrupt(String),
}

impl From<RegistryError> for tessera_core::TesseraError {
    fn from(err: RegistryError) -> Self {
        tessera_core::TesseraError::Store(err.to_string())
    }
}
