//! Node agent error types.

use thiserror::Error;

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Node-related errors.
#[derive(Debug, Error)]
pub enum NodeError {
    /// No factory registered for this worker-type identifier.
    #[error("No worker factory registered for '{0}'")]
    UnknownWorkerType(String),

    /// Worker URL could not be resolved to a bindable address.
    #[error("Invalid worker URL '{0}'")]
    InvalidWorkerUrl(String),

    /// Source checkout failed.
    #[error("Source fetch failed: {0}")]
    Fetch(String),

    /// Bundle registry error.
    #[error(transparent)]
    Registry(#[from] tessera_registry::RegistryError),

    /// Worker runtime error.
    #[error(transparent)]
    Worker(#[from] tessera_worker::WorkerError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NodeError> for tessera_core::TesseraError {
    fn from(err: NodeError) -> Self {
        tessera_core::TesseraError::Internal(err.to_string())
    }
}
