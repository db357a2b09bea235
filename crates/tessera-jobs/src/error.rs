//! Queue and orchestrator error types.

use thiserror::Error;

/// Result type for queue operations.
pub type JobsResult<T> = Result<T, JobsError>;

/// Queue-related errors.
#[derive(Debug, Error)]
pub enum JobsError {
    /// Queue has not been declared.
    #[error("Queue '{0}' is not declared")]
    QueueNotFound(String),

    /// Unknown queue type string.
    #[error("Unknown queue type '{0}'")]
    UnknownQueueType(String),

    /// Schema has not been registered with the orchestrator.
    #[error("Schema '{0}' not found")]
    SchemaNotFound(String),

    /// Operation not supported by this backend.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// AMQP error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Distributed lock could not be acquired.
    #[error("Could not acquire distributed lock '{0}'")]
    LockUnavailable(String),

    /// Consumer error.
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JobsError> for tessera_core::TesseraError {
    fn from(err: JobsError) -> Self {
        tessera_core::TesseraError::Queue(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_not_found_names_queue() {
        let err = JobsError::QueueNotFound("echo".to_string());
        assert_eq!(err.to_string(), "Queue 'echo' is not declared");
    }
}
