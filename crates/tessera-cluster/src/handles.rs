//! Outbound handles to workers and nodes.

use crate::error::{ClusterError, ClusterResult};
use crate::rpc::{
    ConnectToClusterRequest, Empty, HeartbeatResponse, NodeLaunchWorkerRequest, WorkerSelfStatus,
};
use std::time::Duration;

/// Timeout for worker and node control calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

fn control_client() -> ClusterResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(CONTROL_TIMEOUT)
        .build()
        .map_err(|e| ClusterError::Internal(e.to_string()))
}

/// RPC stub for one worker's surface.
pub struct WorkerHandle {
    base_url: String,
    client: reqwest::Client,
}

impl WorkerHandle {
    /// Creates a handle for the worker at `worker_url`.
    pub fn connect(worker_url: impl Into<String>) -> ClusterResult<Self> {
        Ok(Self {
            base_url: worker_url.into().trim_end_matches('/').to_string(),
            client: control_client()?,
        })
    }

    /// The worker's base URL.
    pub fn url(&self) -> &str {
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

    /// Probe the worker's liveness.
    pub async fn heartbeat(&self) -> ClusterResult<HeartbeatResponse> {
        self.post("/heartbeat", &Empty {}).await
    }

    /// Hand the worker its queue binding and the cluster URL.
    pub async fn connect_to_cluster(&self, request: &ConnectToClusterRequest) -> ClusterResult<()> {
        let _: Empty = self.post("/connect_to_cluster", request).await?;
        Ok(())
    }

    /// Ask the worker for its own status.
    pub async fn get_status(&self) -> ClusterResult<WorkerSelfStatus> {
        self.post("/get_status", &Empty {}).await
    }

    /// Ask the worker to shut down.
    pub async fn shutdown(&self) -> ClusterResult<()> {
        let _: Empty = self.post("/shutdown", &Empty {}).await?;
        Ok(())
    }
}

/// RPC stub for one node agent's surface.
pub struct NodeHandle {
    base_url: String,
    client: reqwest::Client,
}

impl NodeHandle {
    /// Creates a handle for the node at `node_url`.
    pub fn connect(node_url: impl Into<String>) -> ClusterResult<Self> {
        Ok(Self {
            base_url: node_url.into().trim_end_matches('/').to_string(),
            client: control_client()?,
        })
    }

    /// Ask the node to launch a worker of `worker_type` at `worker_url`.
    pub async fn launch_worker(&self, worker_type: &str, worker_url: &str) -> ClusterResult<()> {
        let url = format!("{}/launch_worker", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&NodeLaunchWorkerRequest {
                worker_type: worker_type.to_string(),
                worker_url: worker_url.to_string(),
            })
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::HeartbeatState;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_heartbeat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "available",
                "server_id": "w1",
            })))
            .mount(&server)
            .await;

        let handle = WorkerHandle::connect(server.uri()).unwrap();
        let heartbeat = handle.heartbeat().await.unwrap();
        assert_eq!(heartbeat.status, HeartbeatState::Available);
        assert_eq!(heartbeat.server_id, "w1");
    }

    #[tokio::test]
    async fn test_heartbeat_down() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "down",
                "server_id": "w1",
            })))
            .mount(&server)
            .await;

        let handle = WorkerHandle::connect(server.uri()).unwrap();
        assert_eq!(handle.heartbeat().await.unwrap().status, HeartbeatState::Down);
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_transport_error() {
        let handle = WorkerHandle::connect("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            handle.heartbeat().await,
            Err(ClusterError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_node_launch_worker_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/launch_worker"))
            .respond_with(ResponseTemplate::new(500).set_body_string("factory missing"))
            .mount(&server)
            .await;

        let handle = NodeHandle::connect(server.uri()).unwrap();
        let err = handle
            .launch_worker("echoworker", "http://localhost:8004")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("factory missing"));
    }
}
