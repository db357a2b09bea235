//! Worker error types.

use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker-related errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// User-defined processing logic failed.
    #[error("Job processing failed: {0}")]
    Processing(String),

    /// The worker is already bound to a queue.
    #[error("Worker already connected to a cluster")]
    AlreadyConnected,

    /// Cluster callback failed.
    #[error(transparent)]
    Cluster(#[from] tessera_cluster::ClusterError),

    /// Queue layer error.
    #[error(transparent)]
    Jobs(#[from] tessera_jobs::JobsError),

    /// Socket error while serving the worker surface.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorkerError> for tessera_core::TesseraError {
    fn from(err: WorkerError) -> Self {
        tessera_core::TesseraError::Internal(err.to_string())
    }
}
