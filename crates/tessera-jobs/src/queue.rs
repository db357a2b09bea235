//! Queue backend abstraction.

use crate::error::JobsResult;
use crate::job::Job;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Delivery semantics of a declared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// First-in-first-out.
    #[default]
    Fifo,
    /// Last-in-first-out.
    Stack,
    /// Highest numeric priority first; enqueue order breaks ties.
    Priority,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Fifo => write!(f, "fifo"),
            QueueKind::Stack => write!(f, "stack"),
            QueueKind::Priority => write!(f, "priority"),
        }
    }
}

impl FromStr for QueueKind {
    type Err = crate::JobsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(QueueKind::Fifo),
            "stack" => Ok(QueueKind::Stack),
            "priority" => Ok(QueueKind::Priority),
            other => Err(crate::JobsError::UnknownQueueType(other.to_string())),
        }
    }
}

/// Options for publishing a job.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Priority for priority queues. Ignored by FIFO and stack queues.
    pub priority: Option<i64>,
}

impl PublishOptions {
    /// Publish with the given priority.
    pub fn with_priority(priority: i64) -> Self {
        Self {
            priority: Some(priority),
        }
    }
}

/// Arguments a consumer needs to rebuild a backend connection in another
/// process. The in-process broker has no such representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsumerArgs {
    /// Redis backend at the given URL.
    Redis { url: String },
    /// AMQP backend at the given URL.
    Amqp { url: String },
}

/// Pluggable queue backend.
///
/// Implementations provide named queues with FIFO, LIFO, or priority
/// semantics. Message bodies are serialised jobs; the backend assigns a
/// fresh id on publish when the job lacks one.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Declare a queue. Declaring an existing queue is a no-op success.
    async fn declare_queue(&self, queue_name: &str, kind: QueueKind) -> JobsResult<()>;

    /// Delete a declared queue and its pending messages.
    async fn delete_queue(&self, queue_name: &str) -> JobsResult<()>;

    /// Publish a job, returning its id (assigned if absent).
    async fn publish(&self, queue_name: &str, job: &Job, opts: PublishOptions)
        -> JobsResult<String>;

    /// Receive one job. With `block`, suspends up to `timeout` (or
    /// indefinitely when `None`); returns `None` when no message is
    /// available in time.
    async fn receive(
        &self,
        queue_name: &str,
        block: bool,
        timeout: Option<Duration>,
    ) -> JobsResult<Option<Job>>;

    /// Number of pending messages.
    async fn count(&self, queue_name: &str) -> JobsResult<u64>;

    /// Remove all pending messages, returning how many were removed.
    async fn clean(&self, queue_name: &str) -> JobsResult<u64>;

    /// Connection arguments for out-of-process consumers.
    fn consumer_args(&self) -> JobsResult<ConsumerArgs>;
}
