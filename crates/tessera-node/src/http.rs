//! Node HTTP surface.

use crate::error::NodeError;
use crate::node::NodeAgent;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tessera_cluster::rpc::{Empty, NodeLaunchWorkerRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

struct ApiError(NodeError);

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NodeError::UnknownWorkerType(_)
            | NodeError::Registry(tessera_registry::RegistryError::KeyNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            NodeError::InvalidWorkerUrl(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Node operation failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

#[derive(Clone)]
struct NodeHttpState {
    agent: Arc<NodeAgent>,
    shutdown: CancellationToken,
}

/// Builds the node router. `shutdown` is cancelled when `/shutdown` is
/// served.
pub fn node_router(agent: Arc<NodeAgent>, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/launch_worker", post(launch_worker))
        .route("/shutdown", post(shutdown_node))
        .layer(TraceLayer::new_for_http())
        .with_state(NodeHttpState { agent, shutdown })
}

async fn launch_worker(
    State(state): State<NodeHttpState>,
    Json(request): Json<NodeLaunchWorkerRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .agent
        .launch_worker(&request.worker_type, &request.worker_url)
        .await?;
    Ok(Json(Empty {}))
}

async fn shutdown_node(State(state): State<NodeHttpState>) -> Json<Empty> {
    state.agent.shutdown().await;
    state.shutdown.cancel();
    Json(Empty {})
}

/// A node agent serving its RPC surface on a socket.
pub struct NodeServer {
    agent: Arc<NodeAgent>,
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl NodeServer {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The hosted agent.
    pub fn agent(&self) -> &Arc<NodeAgent> {
        &self.agent
    }

    /// Shut down tracked workers and stop the HTTP server.
    pub async fn shutdown(self) {
        self.agent.shutdown().await;
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Node server task join failed");
        }
    }
}

/// Binds the node's RPC surface to `addr` and serves it in the background.
pub async fn serve_node(agent: Arc<NodeAgent>, addr: SocketAddr) -> std::io::Result<NodeServer> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let router = node_router(agent.clone(), shutdown.clone());

    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(error = %e, "Node server error");
            }
        })
    };

    info!(node_addr = %addr, "Node surface bound");
    Ok(NodeServer {
        agent,
        addr,
        shutdown,
        task,
    })
}
