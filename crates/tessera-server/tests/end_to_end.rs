//! End-to-end flows through the cluster manager's HTTP surface.

use async_trait::async_trait;
use axum::routing::post;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tessera_cluster::{
    cluster_router, ClusterClient, ClusterManager, ClusterManagerConfig, ClusterStores, JobState,
    JobStatus, WorkerState,
};
use tessera_jobs::{Job, JobSchema, LocalClient, Orchestrator, QueueKind};
use tessera_registry::{MemoryObjectStore, RegistryCredentials, WorkerTypeRegistry};
use tessera_worker::{WorkerProcessor, WorkerResult, WorkerRuntime};

/// Echoes `message`, sleeping `delay_ms` first when present.
struct EchoProcessor;

#[async_trait]
impl WorkerProcessor for EchoProcessor {
    async fn process(&self, payload: Value) -> WorkerResult<Value> {
        if let Some(delay_ms) = payload["delay_ms"].as_u64() {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        Ok(json!({"echoed": payload["message"]}))
    }
}

struct TestCluster {
    base_url: String,
    manager: Arc<ClusterManager>,
    backend: Arc<LocalClient>,
    client: ClusterClient,
}

/// Serve a cluster manager (plus a direct `/echo` endpoint) on an
/// ephemeral port.
async fn start_cluster() -> TestCluster {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let backend = Arc::new(LocalClient::new());
    let orchestrator = Arc::new(Orchestrator::new(backend.clone()));

    let manager = Arc::new(
        ClusterManager::new(
            ClusterManagerConfig {
                base_url: base_url.clone(),
                registry_credentials: RegistryCredentials {
                    endpoint: "http://localhost:9000".to_string(),
                    access_key: "access".to_string(),
                    secret_key: "secret".to_string(),
                    bucket: "tessera-workers".to_string(),
                },
            },
            orchestrator,
            ClusterStores::memory(),
            WorkerTypeRegistry::new(Arc::new(MemoryObjectStore::new())),
        )
        .unwrap(),
    );

    let router = cluster_router(manager.clone()).route("/echo", post(echo_endpoint));
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    let client = ClusterClient::connect(&base_url).unwrap();
    TestCluster {
        base_url,
        manager,
        backend,
        client,
    }
}

async fn echo_endpoint(Json(job): Json<Job>) -> Json<JobStatus> {
    Json(JobStatus {
        job_id: job.id,
        status: JobState::Completed,
        output: json!({"echoed": job.payload["message"]}),
        worker_id: String::new(),
    })
}

async fn wait_for_state(client: &ClusterClient, job_id: &str, state: JobState) -> JobStatus {
    for _ in 0..100 {
        let status = client.get_job_status(job_id).await.unwrap();
        if status.status == state {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never reached {:?}", job_id, state);
}

#[tokio::test]
async fn test_direct_endpoint_routing() {
    let cluster = start_cluster().await;
    cluster
        .client
        .register_job_to_endpoint("echo", "/echo")
        .await
        .unwrap();

    let mut job = Job::new("echo", json!({"message": "hi"}));
    job.id = "j1".to_string();

    let status = cluster.client.submit_job(&job).await.unwrap();
    assert_eq!(
        status,
        JobStatus {
            job_id: "j1".to_string(),
            status: JobState::Completed,
            output: json!({"echoed": "hi"}),
            worker_id: String::new(),
        }
    );
}

#[tokio::test]
async fn test_routing_miss_terminates_with_error() {
    let cluster = start_cluster().await;

    let mut job = Job::new("ghost", json!({}));
    job.id = "j3".to_string();

    let status = cluster.client.submit_job(&job).await.unwrap();
    assert_eq!(status.status, JobState::Error);
    assert_eq!(
        status.output["error"],
        "No job schema targeting found for job type ghost"
    );
}

#[tokio::test]
async fn test_worker_orchestrated_routing() {
    let cluster = start_cluster().await;

    // Registering the worker type with a job type routes the schema
    // through the orchestrator.
    cluster
        .client
        .register_worker_type(
            "echoworker",
            "workers.echo.EchoWorker",
            json!({}),
            None,
            Some("echo".to_string()),
        )
        .await
        .unwrap();
    cluster
        .manager
        .orchestrator()
        .register(JobSchema::new("echo"), QueueKind::Fifo)
        .await
        .unwrap();

    let mut job = Job::new("echo", json!({"message": "hello", "delay_ms": 500}));
    job.id = "j2".to_string();

    // Submitted before any worker consumes: the job sits queued.
    let status = cluster.client.submit_job(&job).await.unwrap();
    assert_eq!(status.status, JobState::Queued);
    assert_eq!(
        cluster.client.get_job_status("j2").await.unwrap().status,
        JobState::Queued
    );

    // Bring a worker up on the shared backend.
    let runtime = WorkerRuntime::new(Arc::new(EchoProcessor));
    runtime
        .attach_backend(cluster.backend.clone(), "echo", Some(&cluster.base_url))
        .await
        .unwrap();

    let running = wait_for_state(&cluster.client, "j2", JobState::Running).await;
    assert_eq!(running.worker_id, runtime.worker_id());

    // While the job runs, the cluster sees the worker as running it.
    let worker_status = cluster
        .client
        .get_worker_status(runtime.worker_id())
        .await
        .unwrap();
    assert_eq!(worker_status.status, WorkerState::Running);
    assert_eq!(worker_status.job_id.as_deref(), Some("j2"));

    let completed = wait_for_state(&cluster.client, "j2", JobState::Completed).await;
    assert_eq!(completed.output, json!({"echoed": "hello"}));

    let worker_status = cluster
        .client
        .get_worker_status(runtime.worker_id())
        .await
        .unwrap();
    assert_eq!(worker_status.status, WorkerState::Idle);
    assert!(worker_status.job_id.is_none());

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_failed_job_reported_with_empty_output() {
    struct Exploder;

    #[async_trait]
    impl WorkerProcessor for Exploder {
        async fn process(&self, _payload: Value) -> WorkerResult<Value> {
            Err(tessera_worker::WorkerError::Processing(
                "nope".to_string(),
            ))
        }
    }

    let cluster = start_cluster().await;
    cluster
        .client
        .register_worker_type(
            "exploder",
            "workers.exploder.Exploder",
            json!({}),
            None,
            Some("explode".to_string()),
        )
        .await
        .unwrap();
    cluster
        .manager
        .orchestrator()
        .register(JobSchema::new("explode"), QueueKind::Fifo)
        .await
        .unwrap();

    let mut job = Job::new("explode", json!({}));
    job.id = "j4".to_string();
    cluster.client.submit_job(&job).await.unwrap();

    let runtime = WorkerRuntime::new(Arc::new(Exploder));
    runtime
        .attach_backend(cluster.backend.clone(), "explode", Some(&cluster.base_url))
        .await
        .unwrap();

    let failed = wait_for_state(&cluster.client, "j4", JobState::Failed).await;
    assert_eq!(failed.output, json!({}));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_repeated_endpoint_registration_is_idempotent() {
    let cluster = start_cluster().await;
    cluster
        .client
        .register_job_to_endpoint("echo", "/echo")
        .await
        .unwrap();
    cluster
        .client
        .register_job_to_endpoint("echo", "/echo")
        .await
        .unwrap();

    let mut job = Job::new("echo", json!({"message": "twice"}));
    job.id = "j5".to_string();
    let status = cluster.client.submit_job(&job).await.unwrap();
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.output, json!({"echoed": "twice"}));
}

#[tokio::test]
async fn test_get_job_status_unknown_is_not_found() {
    let cluster = start_cluster().await;
    let err = cluster.client.get_job_status("nope").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_clear_databases_over_http() {
    let cluster = start_cluster().await;
    cluster
        .client
        .register_job_to_endpoint("echo", "/echo")
        .await
        .unwrap();

    let mut job = Job::new("echo", json!({"message": "hi"}));
    job.id = "j6".to_string();
    cluster.client.submit_job(&job).await.unwrap();

    cluster.client.clear_databases().await.unwrap();
    assert!(cluster.client.get_job_status("j6").await.is_err());
}
