//! Queue orchestrator facade.

use crate::error::{JobsError, JobsResult};
use crate::job::{job_from_schema, Job, JobSchema, JobSpec};
use crate::queue::{ConsumerArgs, PublishOptions, QueueBackend, QueueKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Message-queue and routing facade over a single backend.
///
/// Declares named queues for registered job schemas, resolves schema
/// references during publish, and forwards the uniform queue operations to
/// the backend. The schema mapping is in-memory only and must be rebuilt by
/// re-registering schemas after a restart.
pub struct Orchestrator {
    backend: Arc<dyn QueueBackend>,
    schemas: RwLock<HashMap<String, JobSchema>>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given backend.
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    /// Connection arguments for out-of-process consumers of this backend.
    pub fn consumer_args(&self) -> JobsResult<ConsumerArgs> {
        self.backend.consumer_args()
    }

    /// Registers a job schema and declares its queue, named after the
    /// schema. Idempotent.
    pub async fn register(&self, schema: JobSchema, kind: QueueKind) -> JobsResult<String> {
        let queue_name = schema.name.clone();
        self.backend.declare_queue(&queue_name, kind).await?;
        self.schemas.write().insert(schema.name.clone(), schema);
        info!(queue = %queue_name, kind = %kind, "Registered job schema");
        Ok(queue_name)
    }

    /// Looks up a registered schema.
    pub fn get_schema(&self, schema_name: &str) -> Option<JobSchema> {
        self.schemas.read().get(schema_name).cloned()
    }

    /// Publishes a job to the named queue, returning its id.
    ///
    /// Accepts either a concrete [`Job`] or a schema reference, which is
    /// resolved against the registered mapping; an unknown reference
    /// errors. Jobs without an id get a fresh UUID.
    pub async fn publish(
        &self,
        queue_name: &str,
        spec: impl Into<JobSpec>,
        opts: PublishOptions,
    ) -> JobsResult<String> {
        let job = match spec.into() {
            JobSpec::Job(job) => job,
            JobSpec::Reference {
                schema_name,
                payload,
            } => {
                let schema = self
                    .get_schema(&schema_name)
                    .ok_or(JobsError::SchemaNotFound(schema_name))?;
                job_from_schema(&schema, payload)
            }
        };

        self.backend.publish(queue_name, &job, opts).await
    }

    /// Retrieves one job from the named queue.
    pub async fn receive_message(
        &self,
        queue_name: &str,
        block: bool,
        timeout: Option<Duration>,
    ) -> JobsResult<Option<Job>> {
        self.backend.receive(queue_name, block, timeout).await
    }

    /// Number of messages pending in the named queue.
    pub async fn count_queue_messages(&self, queue_name: &str) -> JobsResult<u64> {
        self.backend.count(queue_name).await
    }

    /// Removes all messages from the named queue.
    pub async fn clean_queue(&self, queue_name: &str) -> JobsResult<u64> {
        self.backend.clean(queue_name).await
    }

    /// Deletes the named queue.
    pub async fn delete_queue(&self, queue_name: &str) -> JobsResult<()> {
        self.backend.delete_queue(queue_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalClient;
    use serde_json::json;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(LocalClient::new()))
    }

    #[tokio::test]
    async fn test_register_declares_queue() {
        let orchestrator = orchestrator();
        let queue = orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();
        assert_eq!(queue, "echo");
        assert_eq!(orchestrator.count_queue_messages("echo").await.unwrap(), 0);
        assert!(orchestrator.get_schema("echo").is_some());
    }

    #[tokio::test]
    async fn test_register_twice_is_idempotent() {
        let orchestrator = orchestrator();
        orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();
        orchestrator
            .publish("echo", Job::new("echo", json!({})), PublishOptions::default())
            .await
            .unwrap();
        orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();
        // Redeclare must not drop pending messages.
        assert_eq!(orchestrator.count_queue_messages("echo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_and_receive_round_trip() {
        let orchestrator = orchestrator();
        orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();

        let job = Job::new("echo", json!({"message": "hi"}));
        orchestrator
            .publish("echo", job.clone(), PublishOptions::default())
            .await
            .unwrap();

        let received = orchestrator
            .receive_message("echo", false, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, job);
    }

    #[tokio::test]
    async fn test_publish_reference_resolves_schema() {
        let orchestrator = orchestrator();
        orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();

        let id = orchestrator
            .publish(
                "echo",
                JobSpec::Reference {
                    schema_name: "echo".to_string(),
                    payload: json!({"message": "ref"}),
                },
                PublishOptions::default(),
            )
            .await
            .unwrap();
        assert!(!id.is_empty());

        let received = orchestrator
            .receive_message("echo", false, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.schema_name, "echo");
        assert_eq!(received.payload["message"], "ref");
    }

    #[tokio::test]
    async fn test_publish_unknown_reference_errors() {
        let orchestrator = orchestrator();
        orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();

        let err = orchestrator
            .publish(
                "echo",
                JobSpec::Reference {
                    schema_name: "ghost".to_string(),
                    payload: json!({}),
                },
                PublishOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobsError::SchemaNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_clean_and_delete() {
        let orchestrator = orchestrator();
        orchestrator
            .register(JobSchema::new("bulk"), QueueKind::Fifo)
            .await
            .unwrap();
        orchestrator
            .publish("bulk", Job::new("bulk", json!({})), PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(orchestrator.clean_queue("bulk").await.unwrap(), 1);
        orchestrator.delete_queue("bulk").await.unwrap();
        assert!(orchestrator.count_queue_messages("bulk").await.is_err());
    }
}
