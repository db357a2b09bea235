//! Cluster manager error types.

use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Cluster-related errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No job status stored for this job id.
    #[error("Job status not found for job id {0}")]
    JobStatusNotFound(String),

    /// A store returned an impossible result (e.g. two rows per job id).
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// A downstream endpoint answered with a non-success status.
    #[error("Proxy request failed with status {status}: {body}")]
    ProxyFailed { status: u16, body: String },

    /// A worker, node, or endpoint could not be reached.
    #[error("Transport error talking to {target}: {message}")]
    Transport { target: String, message: String },

    /// Queue layer error.
    #[error(transparent)]
    Jobs(#[from] tessera_jobs::JobsError),

    /// Worker registry error.
    #[error(transparent)]
    Registry(#[from] tessera_registry::RegistryError),

    /// Status store error.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    /// Wraps a reqwest error as a transport failure against `target`.
    pub fn transport(target: impl Into<String>, err: reqwest::Error) -> Self {
        ClusterError::Transport {
            target: target.into(),
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for ClusterError {
    fn from(err: redis::RedisError) -> Self {
        ClusterError::Store(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for ClusterError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        ClusterError::Store(err.to_string())
    }
}

impl From<ClusterError> for tessera_core::TesseraError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::JobStatusNotFound(id) => tessera_core::TesseraError::NotFound {
                resource_type: "job_status",
                id,
            },
            ClusterError::Invariant(message) => tessera_core::TesseraError::Invariant(message),
            other => tessera_core::TesseraError::Internal(other.to_string()),
        }
    }
}
