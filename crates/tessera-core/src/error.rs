//! Unified error types for all layers of the cluster.

use thiserror::Error;

/// Unified error type for Tessera.
///
/// This enum provides a comprehensive set of error variants that cover
/// domain, infrastructure, and transport errors raised anywhere in the
/// cluster. Crate-local error enums convert into this type at the seams
/// (server binary, HTTP surface).
#[derive(Error, Debug)]
pub enum TesseraError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate entry)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invariant violation — indicates a bug or a corrupted store.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    // ============ Infrastructure Errors ============
    /// Store (Redis or filesystem) error
    #[error("Store error: {0}")]
    Store(String),

    /// Queue backend error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Downstream HTTP call failed
    #[error("Transport error: {service} - {message}")]
    Transport { service: String, message: String },

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TesseraError {
    /// Returns the stable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            TesseraError::NotFound { .. } => "NOT_FOUND",
            TesseraError::Validation(_) => "VALIDATION",
            TesseraError::Conflict(_) => "CONFLICT",
            TesseraError::Invariant(_) => "INVARIANT",
            TesseraError::Store(_) => "STORE",
            TesseraError::Queue(_) => "QUEUE",
            TesseraError::Configuration(_) => "CONFIGURATION",
            TesseraError::Transport { .. } => "TRANSPORT",
            TesseraError::Timeout(_) => "TIMEOUT",
            TesseraError::Serialization(_) => "SERIALIZATION",
            TesseraError::Internal(_) => "INTERNAL",
            TesseraError::Other(_) => "OTHER",
        }
    }

    /// Returns true for errors a caller can safely retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TesseraError::Transport { .. } | TesseraError::Timeout(_) | TesseraError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = TesseraError::NotFound {
            resource_type: "job_status",
            id: "abc".to_string(),
        };
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(!err.is_retryable());

        let err = TesseraError::Timeout("proxy".to_string());
        assert_eq!(err.code(), "TIMEOUT");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = TesseraError::Queue("queue 'echo' not declared".to_string());
        assert!(err.to_string().contains("echo"));
    }
}
