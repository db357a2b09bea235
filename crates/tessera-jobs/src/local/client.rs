//! In-process queue backend.

use super::{LocalPriorityQueue, LocalQueue, LocalStack};
use crate::error::{JobsError, JobsResult};
use crate::job::Job;
use crate::queue::{ConsumerArgs, PublishOptions, QueueBackend, QueueKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// One declared queue.
#[derive(Debug, Clone)]
enum Handle {
    Fifo(Arc<LocalQueue>),
    Stack(Arc<LocalStack>),
    Priority(Arc<LocalPriorityQueue>),
}

impl Handle {
    fn kind(&self) -> QueueKind {
        match self {
            Handle::Fifo(_) => QueueKind::Fifo,
            Handle::Stack(_) => QueueKind::Stack,
            Handle::Priority(_) => QueueKind::Priority,
        }
    }

    fn push(&self, body: Vec<u8>, priority: Option<i64>) {
        match self {
            Handle::Fifo(q) => q.push(body),
            Handle::Stack(q) => q.push(body),
            Handle::Priority(q) => q.push(body, priority),
        }
    }

    fn pop(&self, block: bool, timeout: Option<Duration>) -> Option<Vec<u8>> {
        match self {
            Handle::Fifo(q) => q.pop(block, timeout),
            Handle::Stack(q) => q.pop(block, timeout),
            Handle::Priority(q) => q.pop(block, timeout),
        }
    }

    fn qsize(&self) -> usize {
        match self {
            Handle::Fifo(q) => q.qsize(),
            Handle::Stack(q) => q.qsize(),
            Handle::Priority(q) => q.qsize(),
        }
    }

    fn clean(&self) -> usize {
        match self {
            Handle::Fifo(q) => q.clean(),
            Handle::Stack(q) => q.clean(),
            Handle::Priority(q) => q.clean(),
        }
    }
}

/// A pure in-process message broker.
///
/// Maintains a shared map of declared queues. Useful for tests and for
/// single-process deployments; queues cannot be consumed from another
/// process.
#[derive(Debug, Default, Clone)]
pub struct LocalClient {
    queues: Arc<RwLock<HashMap<String, Handle>>>,
}

impl LocalClient {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, queue_name: &str) -> JobsResult<Handle> {
        self.queues
            .read()
            .get(queue_name)
            .cloned()
            .ok_or_else(|| JobsError::QueueNotFound(queue_name.to_string()))
    }
}

#[async_trait]
impl QueueBackend for LocalClient {
    async fn declare_queue(&self, queue_name: &str, kind: QueueKind) -> JobsResult<()> {
        let mut queues = self.queues.write();
        if queues.contains_key(queue_name) {
            debug!(queue = queue_name, "Queue already declared");
            return Ok(());
        }
        let handle = match kind {
            QueueKind::Fifo => Handle::Fifo(Arc::new(LocalQueue::new())),
            QueueKind::Stack => Handle::Stack(Arc::new(LocalStack::new())),
            QueueKind::Priority => Handle::Priority(Arc::new(LocalPriorityQueue::new())),
        };
        queues.insert(queue_name.to_string(), handle);
        debug!(queue = queue_name, kind = %kind, "Queue declared");
        Ok(())
    }

    async fn delete_queue(&self, queue_name: &str) -> JobsResult<()> {
        let removed = self.queues.write().remove(queue_name);
        if removed.is_none() {
            return Err(JobsError::QueueNotFound(queue_name.to_string()));
        }
        Ok(())
    }

    async fn publish(
        &self,
        queue_name: &str,
        job: &Job,
        opts: PublishOptions,
    ) -> JobsResult<String> {
        let handle = self.handle(queue_name)?;

        let mut job = job.clone();
        if job.needs_id() {
            job.id = Uuid::new_v4().to_string();
        }
        let job_id = job.id.clone();
        let body = serde_json::to_vec(&job)?;

        let priority = match handle.kind() {
            QueueKind::Priority => opts.priority,
            _ => None,
        };
        handle.push(body, priority);
        Ok(job_id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        block: bool,
        timeout: Option<Duration>,
    ) -> JobsResult<Option<Job>> {
        let handle = self.handle(queue_name)?;

        // Blocking pops park on a condvar; keep them off the async runtime.
        let raw = if block {
            tokio::task::spawn_blocking(move || handle.pop(true, timeout))
                .await
                .map_err(|e| JobsError::Internal(e.to_string()))?
        } else {
            handle.pop(false, None)
        };

        match raw {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    async fn count(&self, queue_name: &str) -> JobsResult<u64> {
        Ok(self.handle(queue_name)?.qsize() as u64)
    }

    async fn clean(&self, queue_name: &str) -> JobsResult<u64> {
        Ok(self.handle(queue_name)?.clean() as u64)
    }

    fn consumer_args(&self) -> JobsResult<ConsumerArgs> {
        Err(JobsError::Unsupported(
            "local queues cannot be consumed from another process".to_string(),
        ))
    }
}
