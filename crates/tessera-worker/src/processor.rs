//! User-defined job logic.

use crate::error::WorkerResult;
use async_trait::async_trait;
use serde_json::Value;

/// The logic a worker runs per job.
///
/// Implementations are wrapped by [`crate::WorkerRuntime`], which owns
/// status mirroring and cluster reporting; `process` only sees the job
/// payload and returns the job output. A failure is reported to the
/// cluster as a failed job and never kills the consumption loop.
#[async_trait]
pub trait WorkerProcessor: Send + Sync + 'static {
    /// One-time initialisation, invoked when the worker joins a cluster
    /// (before consumption starts).
    async fn start(&self) -> WorkerResult<()> {
        Ok(())
    }

    /// Process one job payload, returning the job output.
    async fn process(&self, payload: Value) -> WorkerResult<Value>;
}
