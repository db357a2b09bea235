//! The worker runtime.

use crate::error::{WorkerError, WorkerResult};
use crate::processor::WorkerProcessor;
use crate::status::LocalStatus;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_cluster::rpc::{ConnectToClusterRequest, HeartbeatResponse, HeartbeatState, WorkerSelfStatus};
use tessera_cluster::{ClusterClient, JobState};
use tessera_jobs::{Job, JobHandler, JobsError, JobsResult, QueueBackend, QueueConsumer};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A running consumption subscription.
struct Subscription {
    consumer: Arc<QueueConsumer>,
    task: JoinHandle<()>,
}

/// Hosts a [`WorkerProcessor`]: owns the local status mirror, the queue
/// subscription, and lifecycle reporting to the cluster.
///
/// In disconnected mode (no cluster URL yet) jobs still run; the cluster
/// callbacks are skipped with a warning.
pub struct WorkerRuntime {
    worker_id: String,
    processor: Arc<dyn WorkerProcessor>,
    status: LocalStatus,
    cluster: RwLock<Option<ClusterClient>>,
    subscription: Mutex<Option<Subscription>>,
    accepting: AtomicBool,
}

impl WorkerRuntime {
    /// Creates a runtime around the given processor with a fresh worker id.
    pub fn new(processor: Arc<dyn WorkerProcessor>) -> Arc<Self> {
        let worker_id = Uuid::new_v4().to_string();
        Arc::new(Self {
            status: LocalStatus::new(&worker_id),
            worker_id,
            processor,
            cluster: RwLock::new(None),
            subscription: Mutex::new(None),
            accepting: AtomicBool::new(true),
        })
    }

    /// This worker's id.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Invokes the processor's one-time initialisation hook.
    pub async fn start(&self) -> WorkerResult<()> {
        self.processor.start().await
    }

    /// The worker's own status snapshot.
    pub fn get_status(&self) -> WorkerSelfStatus {
        self.status.snapshot()
    }

    /// Liveness probe response.
    pub fn heartbeat(&self) -> HeartbeatResponse {
        let status = if self.accepting.load(Ordering::SeqCst) {
            HeartbeatState::Available
        } else {
            HeartbeatState::Down
        };
        HeartbeatResponse {
            status,
            server_id: self.worker_id.clone(),
        }
    }

    /// Join a cluster: store the report-back client, run the start hook,
    /// and begin consuming the assigned queue on a background task.
    pub async fn connect_to_cluster(
        self: &Arc<Self>,
        request: ConnectToClusterRequest,
    ) -> WorkerResult<()> {
        let mut subscription = self.subscription.lock().await;
        if subscription.is_some() {
            return Err(WorkerError::AlreadyConnected);
        }

        *self.cluster.write() = Some(ClusterClient::connect(&request.cluster_url)?);
        self.processor.start().await?;

        let consumer =
            QueueConsumer::connect(request.backend_args, &request.queue_name).await?;
        *subscription = Some(self.spawn_subscription(consumer));
        Ok(())
    }

    /// In-process variant of [`Self::connect_to_cluster`] over an
    /// already-connected backend.
    pub async fn attach_backend(
        self: &Arc<Self>,
        backend: Arc<dyn QueueBackend>,
        queue_name: &str,
        cluster_url: Option<&str>,
    ) -> WorkerResult<()> {
        let mut subscription = self.subscription.lock().await;
        if subscription.is_some() {
            return Err(WorkerError::AlreadyConnected);
        }

        if let Some(cluster_url) = cluster_url {
            *self.cluster.write() = Some(ClusterClient::connect(cluster_url)?);
        }
        self.processor.start().await?;

        let consumer = QueueConsumer::new(backend, queue_name);
        *subscription = Some(self.spawn_subscription(consumer));
        Ok(())
    }

    fn spawn_subscription(self: &Arc<Self>, consumer: QueueConsumer) -> Subscription {
        let consumer = Arc::new(consumer);
        let task = {
            let runtime = self.clone();
            let consumer = consumer.clone();
            let queue = consumer.queue_name().to_string();
            tokio::spawn(async move {
                if let Err(e) = consumer.consume(runtime.as_ref(), 0).await {
                    error!(queue = %queue, error = %e, "Consumption loop aborted");
                }
            })
        };

        info!(
            worker_id = %self.worker_id,
            queue = consumer.queue_name(),
            "Worker consuming queue"
        );
        Subscription { consumer, task }
    }

    /// Run one job through the full pipeline: local mirror, started
    /// callback, user logic, idle mirror, completed callback.
    pub async fn run(&self, job: Job) -> WorkerResult<Value> {
        let cluster = self.cluster.read().clone();

        self.status.set_running(&job.id);
        match &cluster {
            Some(cluster) => {
                cluster
                    .worker_alert_started_job(&job.id, &self.worker_id)
                    .await?;
            }
            None => warn!(job_id = %job.id, "No cluster connection; running detached"),
        }

        let result = self.processor.process(job.payload.clone()).await;
        self.status.set_idle();

        match result {
            Ok(output) => {
                if let Some(cluster) = &cluster {
                    cluster
                        .worker_alert_completed_job(
                            &job.id,
                            &self.worker_id,
                            JobState::Completed,
                            output.clone(),
                        )
                        .await?;
                }
                Ok(output)
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Job processing failed");
                if let Some(cluster) = &cluster {
                    cluster
                        .worker_alert_completed_job(
                            &job.id,
                            &self.worker_id,
                            JobState::Failed,
                            json!({}),
                        )
                        .await?;
                }
                Err(WorkerError::Processing(e.to_string()))
            }
        }
    }

    /// Stop consuming and mark the worker down. Idempotent.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);

        let subscription = self.subscription.lock().await.take();
        if let Some(subscription) = subscription {
            subscription.consumer.stop();
            if let Err(e) = subscription.task.await {
                warn!(worker_id = %self.worker_id, error = %e, "Consumer task join failed");
            }
        }

        self.status.set_shutdown();
        info!(worker_id = %self.worker_id, "Worker shut down");
    }
}

#[async_trait]
impl JobHandler for WorkerRuntime {
    async fn handle(&self, job: Job) -> JobsResult<Value> {
        self.run(job)
            .await
            .map_err(|e| JobsError::Consumer(e.to_string()))
    }
}
