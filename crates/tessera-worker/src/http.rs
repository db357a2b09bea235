//! Worker HTTP surface.

use crate::error::{WorkerError, WorkerResult};
use crate::runtime::WorkerRuntime;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tessera_cluster::rpc::{ConnectToClusterRequest, Empty, HeartbeatResponse, WorkerSelfStatus};
use tessera_jobs::Job;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

struct ApiError(WorkerError);

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WorkerError::Processing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkerError::AlreadyConnected => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Worker operation failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

#[derive(Clone)]
struct WorkerHttpState {
    runtime: Arc<WorkerRuntime>,
    shutdown: CancellationToken,
}

/// Builds the worker router. `shutdown` is cancelled when `/shutdown` is
/// served, letting the owning server stop itself.
pub fn worker_router(runtime: Arc<WorkerRuntime>, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/run", post(run))
        .route("/connect_to_cluster", post(connect_to_cluster))
        .route("/get_status", post(get_status))
        .route("/shutdown", post(shutdown_worker))
        .route("/heartbeat", post(heartbeat))
        .layer(TraceLayer::new_for_http())
        .with_state(WorkerHttpState { runtime, shutdown })
}

async fn start(State(state): State<WorkerHttpState>) -> Result<Json<Empty>, ApiError> {
    state.runtime.start().await?;
    Ok(Json(Empty {}))
}

async fn run(
    State(state): State<WorkerHttpState>,
    Json(job): Json<Job>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.runtime.run(job).await?))
}

async fn connect_to_cluster(
    State(state): State<WorkerHttpState>,
    Json(request): Json<ConnectToClusterRequest>,
) -> Result<Json<Empty>, ApiError> {
    state.runtime.connect_to_cluster(request).await?;
    Ok(Json(Empty {}))
}

async fn get_status(State(state): State<WorkerHttpState>) -> Json<WorkerSelfStatus> {
    Json(state.runtime.get_status())
}

async fn shutdown_worker(State(state): State<WorkerHttpState>) -> Json<Empty> {
    state.runtime.shutdown().await;
    state.shutdown.cancel();
    Json(Empty {})
}

async fn heartbeat(State(state): State<WorkerHttpState>) -> Json<HeartbeatResponse> {
    Json(state.runtime.heartbeat())
}

/// A worker serving its RPC surface on a socket.
pub struct WorkerServer {
    runtime: Arc<WorkerRuntime>,
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerServer {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The hosted runtime.
    pub fn runtime(&self) -> &Arc<WorkerRuntime> {
        &self.runtime
    }

    /// Stop the runtime and the HTTP server.
    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Worker server task join failed");
        }
    }
}

/// Binds the worker's RPC surface to `addr` and serves it in the
/// background until shut down (via [`WorkerServer::shutdown`] or the
/// `/shutdown` endpoint).
pub async fn serve_worker(
    runtime: Arc<WorkerRuntime>,
    addr: SocketAddr,
) -> WorkerResult<WorkerServer> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let router = worker_router(runtime.clone(), shutdown.clone());

    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(error = %e, "Worker server error");
            }
        })
    };

    info!(worker_addr = %addr, "Worker surface bound");
    Ok(WorkerServer {
        runtime,
        addr,
        shutdown,
        task,
    })
}
