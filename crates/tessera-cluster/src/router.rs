//! Cluster manager HTTP surface.
//!
//! One POST route per operation, JSON bodies both ways.

use crate::error::ClusterError;
use crate::manager::ClusterManager;
use crate::rpc::{
    Empty, GetJobStatusRequest, GetWorkerStatusRequest, LaunchWorkerRequest,
    RegisterJobSchemaToWorkerTypeRequest, RegisterJobToEndpointRequest, RegisterJobToWorkerRequest,
    RegisterNodeRequest, RegisterWorkerTypeRequest, WorkerAlertCompletedRequest,
    WorkerAlertStartedRequest,
};
use crate::types::{JobStatus, WorkerStatus};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tessera_jobs::Job;
use tessera_registry::RegistryCredentials;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The manager all handlers delegate to.
    pub manager: Arc<ClusterManager>,
}

/// Error wrapper mapping cluster errors onto HTTP statuses.
pub struct ApiError(ClusterError);

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ClusterError::JobStatusNotFound(_) => StatusCode::NOT_FOUND,
            ClusterError::ProxyFailed { .. } | ClusterError::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Cluster operation failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Builds the cluster manager router.
pub fn cluster_router(manager: Arc<ClusterManager>) -> Router {
    Router::new()
        .route("/submit_job", post(submit_job))
        .route("/register_job_to_endpoint", post(register_job_to_endpoint))
        .route("/register_job_to_worker", post(register_job_to_worker))
        .route("/register_worker_type", post(register_worker_type))
        .route(
            "/register_job_schema_to_worker_type",
            post(register_job_schema_to_worker_type),
        )
        .route("/launch_worker", post(launch_worker))
        .route("/register_node", post(register_node))
        .route("/get_job_status", post(get_job_status))
        .route("/get_worker_status", post(get_worker_status))
        .route("/query_worker_status", post(query_worker_status))
        .route("/worker_alert_started_job", post(worker_alert_started_job))
        .route(
            "/worker_alert_completed_job",
            post(worker_alert_completed_job),
        )
        .route("/clear_databases", post(clear_databases))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager })
}

async fn submit_job(State(state): State<AppState>, Json(job): Json<Job>) -> ApiResult<JobStatus> {
    Ok(Json(state.manager.submit_job(&job).await?))
}

async fn register_job_to_endpoint(
    State(state): State<AppState>,
    Json(request): Json<RegisterJobToEndpointRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .register_job_to_endpoint(&request.schema_name, &request.endpoint)
        .await?;
    Ok(Json(Empty {}))
}

async fn register_job_to_worker(
    State(state): State<AppState>,
    Json(request): Json<RegisterJobToWorkerRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .register_job_to_worker(&request.schema_name, &request.worker_url)
        .await?;
    Ok(Json(Empty {}))
}

async fn register_worker_type(
    State(state): State<AppState>,
    Json(request): Json<RegisterWorkerTypeRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .register_worker_type(
            &request.name,
            &request.class_ref,
            request.params,
            request.source_fetch_spec,
            request.job_type.as_deref(),
        )
        .await?;
    Ok(Json(Empty {}))
}

async fn register_job_schema_to_worker_type(
    State(state): State<AppState>,
    Json(request): Json<RegisterJobSchemaToWorkerTypeRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .register_job_schema_to_worker_type(&request.schema_name, &request.worker_type)
        .await?;
    Ok(Json(Empty {}))
}

async fn launch_worker(
    State(state): State<AppState>,
    Json(request): Json<LaunchWorkerRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .launch_worker(&request.node_url, &request.worker_type, &request.worker_url)
        .await?;
    Ok(Json(Empty {}))
}

async fn register_node(
    State(state): State<AppState>,
    Json(request): Json<RegisterNodeRequest>,
) -> ApiResult<RegistryCredentials> {
    Ok(Json(state.manager.register_node(&request.node_url).await?))
}

async fn get_job_status(
    State(state): State<AppState>,
    Json(request): Json<GetJobStatusRequest>,
) -> ApiResult<JobStatus> {
    Ok(Json(state.manager.get_job_status(&request.job_id).await?))
}

async fn get_worker_status(
    State(state): State<AppState>,
    Json(request): Json<GetWorkerStatusRequest>,
) -> ApiResult<WorkerStatus> {
    Ok(Json(
        state.manager.get_worker_status(&request.worker_id).await?,
    ))
}

async fn query_worker_status(
    State(state): State<AppState>,
    Json(request): Json<GetWorkerStatusRequest>,
) -> ApiResult<WorkerStatus> {
    Ok(Json(
        state
            .manager
            .query_worker_status(&request.worker_id)
            .await?,
    ))
}

async fn worker_alert_started_job(
    State(state): State<AppState>,
    Json(request): Json<WorkerAlertStartedRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .worker_alert_started_job(&request.job_id, &request.worker_id)
        .await?;
    Ok(Json(Empty {}))
}

async fn worker_alert_completed_job(
    State(state): State<AppState>,
    Json(request): Json<WorkerAlertCompletedRequest>,
) -> ApiResult<Empty> {
    state
        .manager
        .worker_alert_completed_job(
            &request.job_id,
            &request.worker_id,
            request.status,
            request.output,
        )
        .await?;
    Ok(Json(Empty {}))
}

async fn clear_databases(State(state): State<AppState>) -> ApiResult<Empty> {
    state.manager.clear_databases().await?;
    Ok(Json(Empty {}))
}
