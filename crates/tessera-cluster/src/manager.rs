//! The cluster manager.

use crate::error::{ClusterError, ClusterResult};
use crate::handles::{NodeHandle, WorkerHandle};
use crate::rpc::{ConnectToClusterRequest, HeartbeatState};
use crate::store::ClusterStores;
use crate::types::{
    JobState, JobStatus, JobTargeting, NodeRecord, WorkerAutoConnect, WorkerState, WorkerStatus,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tessera_jobs::{Job, JobSchema, Orchestrator, PublishOptions, QueueKind};
use tessera_registry::{RegistryCredentials, SourceFetchSpec, WorkerBundle, WorkerTypeRegistry};
use tracing::{info, warn};

/// Timeout for synchronous job proxying to endpoints.
const PROXY_TIMEOUT: Duration = Duration::from_secs(60);

/// Cluster manager configuration.
#[derive(Debug, Clone)]
pub struct ClusterManagerConfig {
    /// Externally reachable base URL of this manager. Endpoint-routed jobs
    /// are proxied relative to it, and workers report back to it.
    pub base_url: String,

    /// Credentials handed to nodes so they can read worker bundles.
    pub registry_credentials: RegistryCredentials,
}

/// Owns routing, job/worker status, the worker-type registry, and node
/// membership.
///
/// All state lives in the pluggable [`ClusterStores`]; the manager itself
/// is cheap to clone behind an `Arc` and safe to call concurrently.
pub struct ClusterManager {
    config: ClusterManagerConfig,
    orchestrator: Arc<Orchestrator>,
    stores: ClusterStores,
    registry: WorkerTypeRegistry,
    proxy: reqwest::Client,
}

impl ClusterManager {
    /// Creates a manager over the given orchestrator, stores, and registry.
    pub fn new(
        config: ClusterManagerConfig,
        orchestrator: Arc<Orchestrator>,
        stores: ClusterStores,
        registry: WorkerTypeRegistry,
    ) -> ClusterResult<Self> {
        let proxy = reqwest::Client::builder()
            .timeout(PROXY_TIMEOUT)
            .build()
            .map_err(|e| ClusterError::Internal(e.to_string()))?;

        Ok(Self {
            config,
            orchestrator,
            stores,
            registry,
            proxy,
        })
    }

    /// The manager's externally reachable base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// The orchestrator this manager publishes through.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The worker-type registry.
    pub fn registry(&self) -> &WorkerTypeRegistry {
        &self.registry
    }

    /// Re-register every orchestrator-routed schema with the orchestrator.
    ///
    /// The orchestrator's schema mapping is in-memory; after a restart the
    /// routing table is the durable record to rebuild it from.
    pub async fn restore_routing(&self) -> ClusterResult<()> {
        for entry in self.stores.targeting.all().await? {
            if entry.is_orchestrator() {
                self.orchestrator
                    .register(JobSchema::new(&entry.schema_name), QueueKind::Fifo)
                    .await?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Route `schema_name` to an HTTP endpoint, replacing any prior entry.
    pub async fn register_job_to_endpoint(
        &self,
        schema_name: &str,
        endpoint: &str,
    ) -> ClusterResult<()> {
        self.stores
            .targeting
            .set(&JobTargeting::endpoint(schema_name, endpoint))
            .await?;
        info!(schema = schema_name, endpoint, "Registered job schema to endpoint");
        Ok(())
    }

    /// Route `schema_name` through the orchestrator and bind the worker at
    /// `worker_url` to its queue.
    ///
    /// If the worker's heartbeat reports it down, the binding is skipped
    /// with a warning and the routing entry stays; the call still succeeds.
    pub async fn register_job_to_worker(
        &self,
        schema_name: &str,
        worker_url: &str,
    ) -> ClusterResult<()> {
        self.stores
            .targeting
            .set(&JobTargeting::orchestrator(schema_name))
            .await?;
        self.orchestrator
            .register(JobSchema::new(schema_name), QueueKind::Fifo)
            .await?;

        let worker = WorkerHandle::connect(worker_url)?;
        let heartbeat = worker.heartbeat().await?;
        if heartbeat.status == HeartbeatState::Down {
            warn!(
                worker_url,
                schema = schema_name,
                "Worker heartbeat reports down; skipping binding"
            );
            return Ok(());
        }

        worker
            .connect_to_cluster(&ConnectToClusterRequest {
                backend_args: self.orchestrator.consumer_args()?,
                queue_name: schema_name.to_string(),
                cluster_url: self.config.base_url.clone(),
            })
            .await?;

        self.stores
            .worker_status
            .upsert(&WorkerStatus {
                worker_id: heartbeat.server_id.clone(),
                worker_type: String::new(),
                worker_url: worker_url.to_string(),
                status: WorkerState::Idle,
                job_id: None,
                last_heartbeat: Some(Utc::now()),
            })
            .await?;

        info!(
            schema = schema_name,
            worker_url,
            worker_id = %heartbeat.server_id,
            "Bound worker to job schema"
        );
        Ok(())
    }

    /// Save a worker-type bundle, optionally binding it to a job schema.
    pub async fn register_worker_type(
        &self,
        name: &str,
        class_ref: &str,
        params: Value,
        source_fetch_spec: Option<SourceFetchSpec>,
        job_type: Option<&str>,
    ) -> ClusterResult<()> {
        let mut bundle = WorkerBundle::new(class_ref, params);
        bundle.source_fetch_spec = source_fetch_spec;
        self.registry.save(name, &bundle).await?;

        if let Some(job_type) = job_type {
            self.register_job_schema_to_worker_type(job_type, name)
                .await?;
        }
        Ok(())
    }

    /// Bind a schema to a worker type: future launches of that type pick
    /// the schema up automatically. No-op when the type is unknown.
    pub async fn register_job_schema_to_worker_type(
        &self,
        schema_name: &str,
        worker_type: &str,
    ) -> ClusterResult<()> {
        if !self.registry.contains(worker_type).await? {
            warn!(
                worker_type,
                schema = schema_name,
                "Worker type not registered; skipping schema binding"
            );
            return Ok(());
        }

        self.stores
            .targeting
            .set(&JobTargeting::orchestrator(schema_name))
            .await?;
        self.stores
            .auto_connect
            .insert(&WorkerAutoConnect {
                worker_type: worker_type.to_string(),
                schema_name: schema_name.to_string(),
            })
            .await?;
        info!(worker_type, schema = schema_name, "Bound job schema to worker type");
        Ok(())
    }

    /// Ask a node to launch a worker, then chain auto-connect bindings.
    pub async fn launch_worker(
        &self,
        node_url: &str,
        worker_type: &str,
        worker_url: &str,
    ) -> ClusterResult<()> {
        let node = NodeHandle::connect(node_url)?;
        node.launch_worker(worker_type, worker_url).await?;
        info!(node_url, worker_type, worker_url, "Worker launched on node");

        for binding in self
            .stores
            .auto_connect
            .find_by_worker_type(worker_type)
            .await?
        {
            self.register_job_to_worker(&binding.schema_name, worker_url)
                .await?;
        }
        Ok(())
    }

    /// Record a node and hand back the registry credentials it needs to
    /// materialise worker bundles.
    pub async fn register_node(&self, node_url: &str) -> ClusterResult<RegistryCredentials> {
        self.stores
            .nodes
            .insert(&NodeRecord {
                node_url: node_url.to_string(),
            })
            .await?;
        info!(node_url, "Node registered");
        Ok(self.config.registry_credentials.clone())
    }

    // -----------------------------------------------------------------------
    // Job submission and status
    // -----------------------------------------------------------------------

    /// Accept a job: record it as queued, then route it.
    ///
    /// A missing routing entry terminates the job with status `error`
    /// rather than failing the call; an endpoint proxy failure raises.
    pub async fn submit_job(&self, job: &Job) -> ClusterResult<JobStatus> {
        let mut status = JobStatus::queued(&job.id);
        self.stores.job_status.upsert(&status).await?;

        let Some(targeting) = self.stores.targeting.get(&job.schema_name).await? else {
            status.status = JobState::Error;
            status.output = json!({
                "error": format!(
                    "No job schema targeting found for job type {}",
                    job.schema_name
                )
            });
            self.stores.job_status.upsert(&status).await?;
            warn!(job_id = %job.id, schema = %job.schema_name, "No routing for submitted job");
            return Ok(status);
        };

        if targeting.is_orchestrator() {
            self.orchestrator
                .publish(&job.schema_name, job.clone(), PublishOptions::default())
                .await?;
            info!(job_id = %job.id, schema = %job.schema_name, "Job queued on orchestrator");
            return Ok(status);
        }

        self.proxy_job_to_endpoint(job, &targeting.target_endpoint)
            .await
    }

    /// Synchronously proxy a job to an endpoint under the cluster base URL.
    async fn proxy_job_to_endpoint(
        &self,
        job: &Job,
        endpoint: &str,
    ) -> ClusterResult<JobStatus> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let response = self
            .proxy
            .post(&url)
            .json(job)
            .send()
            .await
            .map_err(|e| ClusterError::transport(&url, e))?;

        let code = response.status();
        if !code.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::ProxyFailed {
                status: code.as_u16(),
                body,
            });
        }

        response
            .json::<JobStatus>()
            .await
            .map_err(|e| ClusterError::transport(&url, e))
    }

    /// Look up the unique status row for `job_id`, raising on a miss.
    pub async fn get_job_status(&self, job_id: &str) -> ClusterResult<JobStatus> {
        let mut rows = self.stores.job_status.find_by_job_id(job_id).await?;
        if rows.len() > 1 {
            return Err(ClusterError::Invariant(format!(
                "{} job status rows for job id {}",
                rows.len(),
                job_id
            )));
        }
        rows.pop()
            .ok_or_else(|| ClusterError::JobStatusNotFound(job_id.to_string()))
    }

    /// The status row for `job_id` when exactly one exists; anything else
    /// is an invariant violation.
    async fn unique_job_status(&self, job_id: &str) -> ClusterResult<JobStatus> {
        let mut rows = self.stores.job_status.find_by_job_id(job_id).await?;
        if rows.len() != 1 {
            return Err(ClusterError::Invariant(format!(
                "expected exactly one job status row for job id {}, found {}",
                job_id,
                rows.len()
            )));
        }
        rows.pop().ok_or_else(|| {
            ClusterError::Invariant(format!("job status row for job id {} vanished", job_id))
        })
    }

    // -----------------------------------------------------------------------
    // Worker lifecycle callbacks
    // -----------------------------------------------------------------------

    /// A worker picked up `job_id`.
    pub async fn worker_alert_started_job(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> ClusterResult<()> {
        let mut status = self.unique_job_status(job_id).await?;

        if status.status.is_terminal() {
            warn!(
                job_id,
                worker_id,
                state = %status.status,
                "Ignoring start alert for terminal job"
            );
            return Ok(());
        }

        status.status = JobState::Running;
        status.worker_id = worker_id.to_string();
        self.stores.job_status.upsert(&status).await?;

        self.update_worker_record(worker_id, WorkerState::Running, Some(job_id.to_string()))
            .await?;
        info!(job_id, worker_id, "Job started");
        Ok(())
    }

    /// A worker finished `job_id` with the given terminal status and output.
    ///
    /// A report from a worker other than the recorded assignee is logged
    /// and still applied: status rows are last-writer-wins, the recorded
    /// assignment is advisory.
    pub async fn worker_alert_completed_job(
        &self,
        job_id: &str,
        worker_id: &str,
        state: JobState,
        output: Value,
    ) -> ClusterResult<()> {
        let mut status = self.unique_job_status(job_id).await?;

        if !status.worker_id.is_empty() && status.worker_id != worker_id {
            warn!(
                job_id,
                reported_by = worker_id,
                assigned_to = %status.worker_id,
                "Completion reported by a different worker; applying anyway"
            );
        }

        if status.status.is_terminal() {
            warn!(
                job_id,
                worker_id,
                state = %status.status,
                "Ignoring completion alert for terminal job"
            );
            return Ok(());
        }

        status.status = state;
        status.output = output;
        status.worker_id = worker_id.to_string();
        self.stores.job_status.upsert(&status).await?;

        self.update_worker_record(worker_id, WorkerState::Idle, None)
            .await?;
        info!(job_id, worker_id, state = %state, "Job completed");
        Ok(())
    }

    /// Overwrite the worker record's state, preserving its registration
    /// metadata when a row already exists.
    async fn update_worker_record(
        &self,
        worker_id: &str,
        state: WorkerState,
        job_id: Option<String>,
    ) -> ClusterResult<()> {
        let mut record = self
            .stores
            .worker_status
            .find_by_worker_id(worker_id)
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| WorkerStatus::nonexistent(worker_id));

        record.status = state;
        record.job_id = job_id;
        record.last_heartbeat = Some(Utc::now());
        self.stores.worker_status.upsert(&record).await
    }

    // -----------------------------------------------------------------------
    // Worker status queries
    // -----------------------------------------------------------------------

    /// Stored worker status; a synthetic `nonexistent` row on a miss.
    pub async fn get_worker_status(&self, worker_id: &str) -> ClusterResult<WorkerStatus> {
        let rows = self
            .stores
            .worker_status
            .find_by_worker_id(worker_id)
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .unwrap_or_else(|| WorkerStatus::nonexistent(worker_id)))
    }

    /// Stored worker status by URL; a synthetic `nonexistent` row on a miss.
    pub async fn get_worker_status_by_url(&self, worker_url: &str) -> ClusterResult<WorkerStatus> {
        let rows = self.stores.worker_status.find_by_url(worker_url).await?;
        Ok(rows.into_iter().next().unwrap_or_else(|| {
            let mut status = WorkerStatus::nonexistent("");
            status.worker_url = worker_url.to_string();
            status
        }))
    }

    /// Reconcile the stored worker record against the live worker.
    ///
    /// An unreachable or down worker overwrites the record as
    /// `nonexistent`; otherwise the worker's self-reported status wins.
    pub async fn query_worker_status(&self, worker_id: &str) -> ClusterResult<WorkerStatus> {
        let mut record = self.get_worker_status(worker_id).await?;
        if record.status == WorkerState::Nonexistent && record.worker_url.is_empty() {
            // Never seen this worker; nothing to probe.
            return Ok(record);
        }

        let live = match WorkerHandle::connect(&record.worker_url) {
            Ok(worker) => match worker.heartbeat().await {
                Ok(heartbeat) if heartbeat.status == HeartbeatState::Available => {
                    worker.get_status().await.ok()
                }
                _ => None,
            },
            Err(_) => None,
        };

        match live {
            Some(live) => {
                record.status = live.status;
                record.job_id = live.job_id;
            }
            None => {
                warn!(worker_id, url = %record.worker_url, "Worker unreachable; marking nonexistent");
                record.status = WorkerState::Nonexistent;
                record.job_id = None;
            }
        }
        record.last_heartbeat = Some(Utc::now());
        self.stores.worker_status.upsert(&record).await?;
        Ok(record)
    }

    /// [`Self::query_worker_status`] addressed by worker URL.
    pub async fn query_worker_status_by_url(
        &self,
        worker_url: &str,
    ) -> ClusterResult<WorkerStatus> {
        let record = self.get_worker_status_by_url(worker_url).await?;
        if record.worker_id.is_empty() {
            return Ok(record);
        }
        self.query_worker_status(&record.worker_id).await
    }

    /// Reconcile every stored worker record against its live worker.
    ///
    /// Workers that stopped answering are marked `nonexistent`. Returns
    /// the ids of the workers that were marked. Intended to run on a
    /// periodic sweep; an unreachable store aborts the sweep.
    pub async fn reconcile_workers(&self) -> ClusterResult<Vec<String>> {
        let mut lost = Vec::new();
        for record in self.stores.worker_status.all().await? {
            if record.status == WorkerState::Nonexistent || record.status == WorkerState::Shutdown
            {
                continue;
            }
            let refreshed = self.query_worker_status(&record.worker_id).await?;
            if refreshed.status == WorkerState::Nonexistent {
                lost.push(record.worker_id);
            }
        }
        if !lost.is_empty() {
            warn!(count = lost.len(), "Marked unreachable workers nonexistent");
        }
        Ok(lost)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Delete every row from every store. Any store failure aborts and
    /// propagates.
    pub async fn clear_databases(&self) -> ClusterResult<()> {
        let jobs = self.stores.job_status.clear().await?;
        let workers = self.stores.worker_status.clear().await?;
        let targeting = self.stores.targeting.clear().await?;
        let bindings = self.stores.auto_connect.clear().await?;
        let nodes = self.stores.nodes.clear().await?;
        info!(jobs, workers, targeting, bindings, nodes, "Cleared cluster databases");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClusterStores;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tessera_jobs::{ConsumerArgs, JobsResult, LocalClient, QueueBackend};
    use tessera_registry::{MemoryObjectStore, WorkerTypeRegistry};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Local backend that pretends to be consumable out-of-process, so the
    /// worker-binding path can run against HTTP test doubles.
    struct StubBackend(LocalClient);

    #[async_trait]
    impl QueueBackend for StubBackend {
        async fn declare_queue(&self, queue_name: &str, kind: QueueKind) -> JobsResult<()> {
            self.0.declare_queue(queue_name, kind).await
        }
        async fn delete_queue(&self, queue_name: &str) -> JobsResult<()> {
            self.0.delete_queue(queue_name).await
        }
        async fn publish(
            &self,
            queue_name: &str,
            job: &Job,
            opts: PublishOptions,
        ) -> JobsResult<String> {
            self.0.publish(queue_name, job, opts).await
        }
        async fn receive(
            &self,
            queue_name: &str,
            block: bool,
            timeout: Option<Duration>,
        ) -> JobsResult<Option<Job>> {
            self.0.receive(queue_name, block, timeout).await
        }
        async fn count(&self, queue_name: &str) -> JobsResult<u64> {
            self.0.count(queue_name).await
        }
        async fn clean(&self, queue_name: &str) -> JobsResult<u64> {
            self.0.clean(queue_name).await
        }
        fn consumer_args(&self) -> JobsResult<ConsumerArgs> {
            Ok(ConsumerArgs::Redis {
                url: "redis://stub:6379/0".to_string(),
            })
        }
    }

    fn credentials() -> RegistryCredentials {
        RegistryCredentials {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            bucket: "tessera-workers".to_string(),
        }
    }

    fn manager_with_base(base_url: &str) -> ClusterManager {
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(StubBackend(LocalClient::new()))));
        ClusterManager::new(
            ClusterManagerConfig {
                base_url: base_url.to_string(),
                registry_credentials: credentials(),
            },
            orchestrator,
            ClusterStores::memory(),
            WorkerTypeRegistry::new(Arc::new(MemoryObjectStore::new())),
        )
        .unwrap()
    }

    fn manager() -> ClusterManager {
        manager_with_base("http://localhost:8000")
    }

    fn available_heartbeat(worker_id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "status": "available",
            "server_id": worker_id,
        }))
    }

    // -- routing ------------------------------------------------------------

    #[tokio::test]
    async fn test_submit_job_without_routing_terminates_with_error() {
        let manager = manager();
        let job = Job::new("ghost", json!({}));

        let status = manager.submit_job(&job).await.unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(
            status.output["error"],
            "No job schema targeting found for job type ghost"
        );

        // The terminal row is persisted.
        let stored = manager.get_job_status(&job.id).await.unwrap();
        assert_eq!(stored.status, JobState::Error);
    }

    #[tokio::test]
    async fn test_submit_job_routes_to_orchestrator() {
        let manager = manager();
        manager
            .stores
            .targeting
            .set(&JobTargeting::orchestrator("echo"))
            .await
            .unwrap();
        manager
            .orchestrator
            .register(JobSchema::new("echo"), QueueKind::Fifo)
            .await
            .unwrap();

        let job = Job::new("echo", json!({"message": "hi"}));
        let status = manager.submit_job(&job).await.unwrap();
        assert_eq!(status.status, JobState::Queued);

        assert_eq!(
            manager.orchestrator.count_queue_messages("echo").await.unwrap(),
            1
        );
        let queued = manager
            .orchestrator
            .receive_message("echo", false, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queued, job);
    }

    #[tokio::test]
    async fn test_submit_job_proxies_to_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(body_partial_json(json!({"schema_name": "echo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": "j1",
                "status": "completed",
                "output": {"echoed": "hi"},
                "worker_id": "",
            })))
            .mount(&server)
            .await;

        let manager = manager_with_base(&server.uri());
        manager
            .register_job_to_endpoint("echo", "/echo")
            .await
            .unwrap();

        let mut job = Job::new("echo", json!({"message": "hi"}));
        job.id = "j1".to_string();

        let status = manager.submit_job(&job).await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.output, json!({"echoed": "hi"}));
        assert_eq!(status.worker_id, "");
    }

    #[tokio::test]
    async fn test_submit_job_proxy_failure_raises() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(500).set_body_string("endpoint exploded"))
            .mount(&server)
            .await;

        let manager = manager_with_base(&server.uri());
        manager
            .register_job_to_endpoint("echo", "/echo")
            .await
            .unwrap();

        let job = Job::new("echo", json!({}));
        let err = manager.submit_job(&job).await.unwrap_err();
        assert!(matches!(
            err,
            ClusterError::ProxyFailed { status: 500, .. }
        ));

        // The job stays queued for the caller to retry.
        let stored = manager.get_job_status(&job.id).await.unwrap();
        assert_eq!(stored.status, JobState::Queued);
    }

    #[tokio::test]
    async fn test_register_job_to_endpoint_replaces_prior_entry() {
        let manager = manager();
        manager
            .register_job_to_endpoint("echo", "/old")
            .await
            .unwrap();
        manager
            .register_job_to_endpoint("echo", "/new")
            .await
            .unwrap();

        let all = manager.stores.targeting.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target_endpoint, "/new");

        // Idempotence: applying the same registration twice changes nothing.
        manager
            .register_job_to_endpoint("echo", "/new")
            .await
            .unwrap();
        assert_eq!(manager.stores.targeting.all().await.unwrap(), all);
    }

    // -- worker binding -----------------------------------------------------

    #[tokio::test]
    async fn test_register_job_to_worker_binds_live_worker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(available_heartbeat("w1"))
            .mount(&server)
            .await;
        let connect_mock = Mock::given(method("POST"))
            .and(path("/connect_to_cluster"))
            .and(body_partial_json(json!({"queue_name": "echo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let manager = manager();
        manager
            .register_job_to_worker("echo", &server.uri())
            .await
            .unwrap();

        let status = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(status.status, WorkerState::Idle);
        assert_eq!(status.worker_url, server.uri());
        assert!(status.last_heartbeat.is_some());

        let targeting = manager.stores.targeting.get("echo").await.unwrap().unwrap();
        assert!(targeting.is_orchestrator());

        drop(connect_mock);
    }

    #[tokio::test]
    async fn test_register_job_to_worker_skips_down_worker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "down",
                "server_id": "w1",
            })))
            .mount(&server)
            .await;
        let connect_mock = Mock::given(method("POST"))
            .and(path("/connect_to_cluster"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount_as_scoped(&server)
            .await;

        let manager = manager();
        // Succeeds without binding.
        manager
            .register_job_to_worker("echo", &server.uri())
            .await
            .unwrap();

        let status = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(status.status, WorkerState::Nonexistent);

        drop(connect_mock);
    }

    // -- worker types and nodes ---------------------------------------------

    #[tokio::test]
    async fn test_register_worker_type_saves_bundle() {
        let manager = manager();
        manager
            .register_worker_type(
                "echoworker",
                "workers.echo.EchoWorker",
                json!({"delay": 1}),
                None,
                None,
            )
            .await
            .unwrap();

        let bundle = manager.registry.load("echoworker").await.unwrap();
        assert_eq!(bundle.worker_type, "workers.echo.EchoWorker");
        assert_eq!(bundle.worker_params["delay"], 1);
    }

    #[tokio::test]
    async fn test_register_worker_type_with_job_type_chains_binding() {
        let manager = manager();
        manager
            .register_worker_type(
                "echoworker",
                "workers.echo.EchoWorker",
                json!({}),
                None,
                Some("echo"),
            )
            .await
            .unwrap();

        let targeting = manager.stores.targeting.get("echo").await.unwrap().unwrap();
        assert!(targeting.is_orchestrator());

        let bindings = manager
            .stores
            .auto_connect
            .find_by_worker_type("echoworker")
            .await
            .unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].schema_name, "echo");
    }

    #[tokio::test]
    async fn test_register_job_schema_to_unknown_worker_type_is_noop() {
        let manager = manager();
        manager
            .register_job_schema_to_worker_type("echo", "ghostworker")
            .await
            .unwrap();

        assert!(manager.stores.targeting.get("echo").await.unwrap().is_none());
        assert!(manager
            .stores
            .auto_connect
            .find_by_worker_type("ghostworker")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_launch_worker_chains_auto_connect() {
        let node = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/launch_worker"))
            .and(body_partial_json(json!({"worker_type": "echoworker"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&node)
            .await;

        let worker = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(available_heartbeat("w1"))
            .mount(&worker)
            .await;
        Mock::given(method("POST"))
            .and(path("/connect_to_cluster"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&worker)
            .await;

        let manager = manager();
        manager
            .register_worker_type(
                "echoworker",
                "workers.echo.EchoWorker",
                json!({}),
                None,
                Some("echo"),
            )
            .await
            .unwrap();

        manager
            .launch_worker(&node.uri(), "echoworker", &worker.uri())
            .await
            .unwrap();

        let status = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(status.status, WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_launch_worker_without_auto_connect_only_launches() {
        let node = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/launch_worker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&node)
            .await;

        let manager = manager();
        manager
            .launch_worker(&node.uri(), "plainworker", "http://localhost:8004")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_launch_worker_node_failure_propagates() {
        let manager = manager();
        let err = manager
            .launch_worker("http://127.0.0.1:1", "echoworker", "http://localhost:8004")
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_register_node_returns_credentials() {
        let manager = manager();
        let creds = manager
            .register_node("http://localhost:8003")
            .await
            .unwrap();
        assert_eq!(creds, credentials());

        let nodes = manager.stores.nodes.all().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_url, "http://localhost:8003");
    }

    // -- lifecycle callbacks ------------------------------------------------

    #[tokio::test]
    async fn test_started_then_completed_lifecycle() {
        let manager = manager();
        // Seed a queued row directly so routing is irrelevant here.
        manager
            .stores
            .job_status
            .upsert(&JobStatus::queued("j1"))
            .await
            .unwrap();

        manager.worker_alert_started_job("j1", "w1").await.unwrap();
        let running = manager.get_job_status("j1").await.unwrap();
        assert_eq!(running.status, JobState::Running);
        assert_eq!(running.worker_id, "w1");

        let worker = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(worker.status, WorkerState::Running);
        assert_eq!(worker.job_id.as_deref(), Some("j1"));

        manager
            .worker_alert_completed_job("j1", "w1", JobState::Completed, json!({"echoed": "hi"}))
            .await
            .unwrap();
        let completed = manager.get_job_status("j1").await.unwrap();
        assert_eq!(completed.status, JobState::Completed);
        assert_eq!(completed.output, json!({"echoed": "hi"}));

        let worker = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(worker.status, WorkerState::Idle);
        assert!(worker.job_id.is_none());
    }

    #[tokio::test]
    async fn test_alert_for_unknown_job_is_invariant_violation() {
        let manager = manager();
        assert!(matches!(
            manager.worker_alert_started_job("nope", "w1").await,
            Err(ClusterError::Invariant(_))
        ));
        assert!(matches!(
            manager
                .worker_alert_completed_job("nope", "w1", JobState::Completed, json!({}))
                .await,
            Err(ClusterError::Invariant(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_from_other_worker_applies_last_writer_wins() {
        let manager = manager();
        manager
            .stores
            .job_status
            .upsert(&JobStatus::queued("j1"))
            .await
            .unwrap();
        manager.worker_alert_started_job("j1", "w1").await.unwrap();

        manager
            .worker_alert_completed_job("j1", "w2", JobState::Completed, json!({"by": "w2"}))
            .await
            .unwrap();

        let status = manager.get_job_status("j1").await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.worker_id, "w2");
        assert_eq!(status.output, json!({"by": "w2"}));
    }

    #[tokio::test]
    async fn test_terminal_status_never_transitions() {
        let manager = manager();
        manager
            .stores
            .job_status
            .upsert(&JobStatus::queued("j1"))
            .await
            .unwrap();
        manager.worker_alert_started_job("j1", "w1").await.unwrap();
        manager
            .worker_alert_completed_job("j1", "w1", JobState::Completed, json!({"n": 1}))
            .await
            .unwrap();

        // Late duplicate completion and late start are both ignored.
        manager
            .worker_alert_completed_job("j1", "w1", JobState::Failed, json!({}))
            .await
            .unwrap();
        manager.worker_alert_started_job("j1", "w1").await.unwrap();

        let status = manager.get_job_status("j1").await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.output, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_get_job_status_missing_raises() {
        let manager = manager();
        assert!(matches!(
            manager.get_job_status("nope").await,
            Err(ClusterError::JobStatusNotFound(_))
        ));
    }

    // -- status queries -----------------------------------------------------

    #[tokio::test]
    async fn test_get_worker_status_miss_is_synthetic_nonexistent() {
        let manager = manager();
        let status = manager.get_worker_status("ghost").await.unwrap();
        assert_eq!(status.status, WorkerState::Nonexistent);
        assert_eq!(status.worker_id, "ghost");

        let by_url = manager
            .get_worker_status_by_url("http://localhost:9999")
            .await
            .unwrap();
        assert_eq!(by_url.status, WorkerState::Nonexistent);
    }

    #[tokio::test]
    async fn test_query_worker_status_reconciles_live_worker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(available_heartbeat("w1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/get_status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "worker_id": "w1",
                "status": "running",
                "job_id": "j2",
            })))
            .mount(&server)
            .await;

        let manager = manager();
        manager
            .stores
            .worker_status
            .upsert(&WorkerStatus {
                worker_id: "w1".to_string(),
                worker_type: String::new(),
                worker_url: server.uri(),
                status: WorkerState::Idle,
                job_id: None,
                last_heartbeat: None,
            })
            .await
            .unwrap();

        let status = manager.query_worker_status("w1").await.unwrap();
        assert_eq!(status.status, WorkerState::Running);
        assert_eq!(status.job_id.as_deref(), Some("j2"));

        // The stored row was overwritten with the live view.
        let stored = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(stored.status, WorkerState::Running);
    }

    #[tokio::test]
    async fn test_query_worker_status_marks_dead_worker_nonexistent() {
        let manager = manager();
        manager
            .stores
            .worker_status
            .upsert(&WorkerStatus {
                worker_id: "w1".to_string(),
                worker_type: String::new(),
                worker_url: "http://127.0.0.1:1".to_string(),
                status: WorkerState::Running,
                job_id: Some("j2".to_string()),
                last_heartbeat: None,
            })
            .await
            .unwrap();

        let status = manager.query_worker_status("w1").await.unwrap();
        assert_eq!(status.status, WorkerState::Nonexistent);
        assert!(status.job_id.is_none());
        assert!(status.last_heartbeat.is_some());

        let stored = manager.get_worker_status("w1").await.unwrap();
        assert_eq!(stored.status, WorkerState::Nonexistent);
    }

    #[tokio::test]
    async fn test_reconcile_marks_only_unreachable_workers() {
        let live = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(available_heartbeat("alive"))
            .mount(&live)
            .await;
        Mock::given(method("POST"))
            .and(path("/get_status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "worker_id": "alive",
                "status": "idle",
                "job_id": null,
            })))
            .mount(&live)
            .await;

        let manager = manager();
        for (worker_id, url) in [("alive", live.uri()), ("dead", "http://127.0.0.1:1".into())] {
            manager
                .stores
                .worker_status
                .upsert(&WorkerStatus {
                    worker_id: worker_id.to_string(),
                    worker_type: String::new(),
                    worker_url: url,
                    status: WorkerState::Idle,
                    job_id: None,
                    last_heartbeat: None,
                })
                .await
                .unwrap();
        }

        let lost = manager.reconcile_workers().await.unwrap();
        assert_eq!(lost, vec!["dead".to_string()]);
        assert_eq!(
            manager.get_worker_status("alive").await.unwrap().status,
            WorkerState::Idle
        );
        assert_eq!(
            manager.get_worker_status("dead").await.unwrap().status,
            WorkerState::Nonexistent
        );

        // A second sweep skips the already-marked worker.
        assert!(manager.reconcile_workers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_worker_status_by_url() {
        let manager = manager();
        manager
            .stores
            .worker_status
            .upsert(&WorkerStatus {
                worker_id: "w1".to_string(),
                worker_type: String::new(),
                worker_url: "http://127.0.0.1:1".to_string(),
                status: WorkerState::Idle,
                job_id: None,
                last_heartbeat: None,
            })
            .await
            .unwrap();

        let status = manager
            .query_worker_status_by_url("http://127.0.0.1:1")
            .await
            .unwrap();
        assert_eq!(status.worker_id, "w1");
        assert_eq!(status.status, WorkerState::Nonexistent);
    }

    // -- administration -----------------------------------------------------

    #[tokio::test]
    async fn test_clear_databases_empties_every_store() {
        let manager = manager();
        manager
            .stores
            .job_status
            .upsert(&JobStatus::queued("j1"))
            .await
            .unwrap();
        manager
            .register_job_to_endpoint("echo", "/echo")
            .await
            .unwrap();
        manager.register_node("http://localhost:8003").await.unwrap();

        manager.clear_databases().await.unwrap();

        assert!(matches!(
            manager.get_job_status("j1").await,
            Err(ClusterError::JobStatusNotFound(_))
        ));
        assert!(manager.stores.targeting.all().await.unwrap().is_empty());
        assert!(manager.stores.nodes.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_routing_rebuilds_schema_mapping() {
        let manager = manager();
        manager
            .stores
            .targeting
            .set(&JobTargeting::orchestrator("echo"))
            .await
            .unwrap();
        manager
            .stores
            .targeting
            .set(&JobTargeting::endpoint("direct", "/direct"))
            .await
            .unwrap();

        manager.restore_routing().await.unwrap();

        assert!(manager.orchestrator.get_schema("echo").is_some());
        assert!(manager.orchestrator.get_schema("direct").is_none());
    }
}
