//! Queue consumer.

use crate::amqp::AmqpClient;
use crate::error::JobsResult;
use crate::job::Job;
use crate::queue::{ConsumerArgs, QueueBackend};
use crate::redis::RedisClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How long each blocking pop waits before re-checking for cancellation.
const POP_INTERVAL: Duration = Duration::from_secs(1);

/// Processes jobs popped from a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handle one job, returning its output.
    async fn handle(&self, job: Job) -> JobsResult<Value>;
}

/// Pulls jobs from one queue and feeds them to a handler.
///
/// A single job failure is logged and never terminates the loop; the
/// consumer stops only through its cancellation token.
pub struct QueueConsumer {
    backend: Arc<dyn QueueBackend>,
    queue_name: String,
    cancel: CancellationToken,
}

impl QueueConsumer {
    /// Creates a consumer over an already-connected backend.
    pub fn new(backend: Arc<dyn QueueBackend>, queue_name: impl Into<String>) -> Self {
        Self {
            backend,
            queue_name: queue_name.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Reconstructs a backend connection from serialised arguments and
    /// binds to the named queue. This is how a worker in another process
    /// joins the cluster's backend.
    pub async fn connect(args: ConsumerArgs, queue_name: impl Into<String>) -> JobsResult<Self> {
        let backend: Arc<dyn QueueBackend> = match args {
            ConsumerArgs::Redis { url } => Arc::new(RedisClient::connect(&url, 4).await?),
            ConsumerArgs::Amqp { url } => Arc::new(AmqpClient::connect(&url).await?),
        };
        Ok(Self::new(backend, queue_name))
    }

    /// The queue this consumer is bound to.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Token that stops the consume loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pop one job, waiting up to `timeout` when blocking.
    pub async fn next(&self, block: bool, timeout: Option<Duration>) -> JobsResult<Option<Job>> {
        self.backend.receive(&self.queue_name, block, timeout).await
    }

    /// Consume until cancelled. With `num_messages > 0`, stops after that
    /// many jobs have been handled.
    pub async fn consume(&self, handler: &dyn JobHandler, num_messages: usize) -> JobsResult<()> {
        let mut handled = 0usize;
        info!(queue = %self.queue_name, "Consumer started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.next(true, Some(POP_INTERVAL)) => match result {
                    Ok(job) => job,
                    Err(e) => {
                        error!(queue = %self.queue_name, error = %e, "Failed to pop from queue");
                        tokio::time::sleep(POP_INTERVAL).await;
                        continue;
                    }
                },
            };

            let Some(job) = job else { continue };

            let job_id = job.id.clone();
            debug!(queue = %self.queue_name, job_id = %job_id, "Handling job");

            if let Err(e) = handler.handle(job).await {
                error!(queue = %self.queue_name, job_id = %job_id, error = %e, "Job handler failed");
            }

            handled += 1;
            if num_messages > 0 && handled >= num_messages {
                break;
            }
        }

        info!(queue = %self.queue_name, handled, "Consumer stopped");
        Ok(())
    }

    /// Consume non-blocking until the queue is drained.
    pub async fn consume_until_empty(&self, handler: &dyn JobHandler) -> JobsResult<usize> {
        let mut handled = 0usize;

        while !self.cancel.is_cancelled() {
            match self.next(false, None).await? {
                Some(job) => {
                    let job_id = job.id.clone();
                    if let Err(e) = handler.handle(job).await {
                        error!(queue = %self.queue_name, job_id = %job_id, error = %e, "Job handler failed");
                    }
                    handled += 1;
                }
                None => break,
            }
        }

        Ok(handled)
    }

    /// Stops the consume loop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
