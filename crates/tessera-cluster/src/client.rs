//! Typed client for the cluster manager's RPC surface.
//!
//! Workers use this to report lifecycle transitions; admin tooling and
//! tests use the registration operations.

use crate::error::{ClusterError, ClusterResult};
use crate::rpc::{
    Empty, GetJobStatusRequest, GetWorkerStatusRequest, LaunchWorkerRequest,
    RegisterJobSchemaToWorkerTypeRequest, RegisterJobToEndpointRequest, RegisterJobToWorkerRequest,
    RegisterNodeRequest, RegisterWorkerTypeRequest, WorkerAlertCompletedRequest,
    WorkerAlertStartedRequest,
};
use crate::types::{JobState, JobStatus, WorkerStatus};
use serde_json::Value;
use std::time::Duration;
use tessera_jobs::Job;
use tessera_registry::{RegistryCredentials, SourceFetchSpec};

/// Timeout for cluster calls other than `submit_job` (which may proxy
/// synchronously and carries the server-side 60 s budget).
const CLIENT_TIMEOUT: Duration = Duration::from_secs(70);

/// RPC stub for one cluster manager.
#[derive(Clone)]
pub struct ClusterClient {
    base_url: String,
    client: reqwest::Client,
}

impl ClusterClient {
    /// Creates a client for the cluster at `base_url`.
    pub fn connect(base_url: impl Into<String>) -> ClusterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| ClusterError::Internal(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The cluster's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> ClusterResult<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClusterError::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::Transport {
                target: url,
                message: format!("status {}: {}", status.as_u16(), body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClusterError::transport(&url, e))
    }

    /// Submit a job for routing.
    pub async fn submit_job(&self, job: &Job) -> ClusterResult<JobStatus> {
        self.post("/submit_job", job).await
    }

    /// Route a schema to an HTTP endpoint.
    pub async fn register_job_to_endpoint(
        &self,
        schema_name: &str,
        endpoint: &str,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/register_job_to_endpoint",
                &RegisterJobToEndpointRequest {
                    schema_name: schema_name.to_string(),
                    endpoint: endpoint.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Route a schema through the orchestrator and bind a worker.
    pub async fn register_job_to_worker(
        &self,
        schema_name: &str,
        worker_url: &str,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/register_job_to_worker",
                &RegisterJobToWorkerRequest {
                    schema_name: schema_name.to_string(),
                    worker_url: worker_url.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Save a worker-type bundle.
    pub async fn register_worker_type(
        &self,
        name: &str,
        class_ref: &str,
        params: Value,
        source_fetch_spec: Option<SourceFetchSpec>,
        job_type: Option<String>,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/register_worker_type",
                &RegisterWorkerTypeRequest {
                    name: name.to_string(),
                    class_ref: class_ref.to_string(),
                    params,
                    source_fetch_spec,
                    job_type,
                },
            )
            .await?;
        Ok(())
    }

    /// Bind a schema to a worker type.
    pub async fn register_job_schema_to_worker_type(
        &self,
        schema_name: &str,
        worker_type: &str,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/register_job_schema_to_worker_type",
                &RegisterJobSchemaToWorkerTypeRequest {
                    schema_name: schema_name.to_string(),
                    worker_type: worker_type.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Launch a worker on a node.
    pub async fn launch_worker(
        &self,
        node_url: &str,
        worker_type: &str,
        worker_url: &str,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/launch_worker",
                &LaunchWorkerRequest {
                    node_url: node_url.to_string(),
                    worker_type: worker_type.to_string(),
                    worker_url: worker_url.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Register a node and obtain bundle-store credentials.
    pub async fn register_node(&self, node_url: &str) -> ClusterResult<RegistryCredentials> {
        self.post(
            "/register_node",
            &RegisterNodeRequest {
                node_url: node_url.to_string(),
            },
        )
        .await
    }

    /// Fetch a job's status.
    pub async fn get_job_status(&self, job_id: &str) -> ClusterResult<JobStatus> {
        self.post(
            "/get_job_status",
            &GetJobStatusRequest {
                job_id: job_id.to_string(),
            },
        )
        .await
    }

    /// Fetch a worker's stored status.
    pub async fn get_worker_status(&self, worker_id: &str) -> ClusterResult<WorkerStatus> {
        self.post(
            "/get_worker_status",
            &GetWorkerStatusRequest {
                worker_id: worker_id.to_string(),
            },
        )
        .await
    }

    /// Reconcile and fetch a worker's status.
    pub async fn query_worker_status(&self, worker_id: &str) -> ClusterResult<WorkerStatus> {
        self.post(
            "/query_worker_status",
            &GetWorkerStatusRequest {
                worker_id: worker_id.to_string(),
            },
        )
        .await
    }

    /// Report that a worker started a job.
    pub async fn worker_alert_started_job(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/worker_alert_started_job",
                &WorkerAlertStartedRequest {
                    job_id: job_id.to_string(),
                    worker_id: worker_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Report that a worker finished a job.
    pub async fn worker_alert_completed_job(
        &self,
        job_id: &str,
        worker_id: &str,
        status: JobState,
        output: Value,
    ) -> ClusterResult<()> {
        let _: Empty = self
            .post(
                "/worker_alert_completed_job",
                &WorkerAlertCompletedRequest {
                    job_id: job_id.to_string(),
                    worker_id: worker_id.to_string(),
                    status,
                    output,
                },
            )
            .await?;
        Ok(())
    }

    /// Delete every row from every cluster store.
    pub async fn clear_databases(&self) -> ClusterResult<()> {
        let _: Empty = self.post("/clear_databases", &Empty {}).await?;
        Ok(())
    }
}
