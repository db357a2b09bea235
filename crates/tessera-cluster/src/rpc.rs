//! Wire types for the cluster, worker, and node RPC surfaces.
//!
//! Every operation is JSON over HTTP POST, one endpoint per operation.
//! These types are shared by the axum routers, the reqwest stubs, and the
//! worker/node crates.

use crate::types::{JobState, WorkerState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_jobs::ConsumerArgs;
use tessera_registry::SourceFetchSpec;

/// Empty request/response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

// ---------------------------------------------------------------------------
// Cluster manager surface
// ---------------------------------------------------------------------------

/// `/register_job_to_endpoint`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterJobToEndpointRequest {
    pub schema_name: String,
    pub endpoint: String,
}

/// `/register_job_to_worker`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterJobToWorkerRequest {
    pub schema_name: String,
    pub worker_url: String,
}

/// `/register_worker_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerTypeRequest {
    pub name: String,
    pub class_ref: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_fetch_spec: Option<SourceFetchSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
}

/// `/register_job_schema_to_worker_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterJobSchemaToWorkerTypeRequest {
    pub schema_name: String,
    pub worker_type: String,
}

/// `/launch_worker`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchWorkerRequest {
    pub node_url: String,
    pub worker_type: String,
    pub worker_url: String,
}

/// `/register_node`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub node_url: String,
}

/// `/get_job_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobStatusRequest {
    pub job_id: String,
}

/// `/get_worker_status` and `/query_worker_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkerStatusRequest {
    pub worker_id: String,
}

/// `/worker_alert_started_job`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAlertStartedRequest {
    pub job_id: String,
    pub worker_id: String,
}

/// `/worker_alert_completed_job`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAlertCompletedRequest {
    pub job_id: String,
    pub worker_id: String,
    pub status: JobState,
    #[serde(default)]
    pub output: Value,
}

// ---------------------------------------------------------------------------
// Worker surface
// ---------------------------------------------------------------------------

/// `/connect_to_cluster` on a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectToClusterRequest {
    /// How to rebuild the queue backend connection.
    pub backend_args: ConsumerArgs,
    /// Queue the worker consumes.
    pub queue_name: String,
    /// Cluster URL the worker reports lifecycle transitions to.
    pub cluster_url: String,
}

/// Liveness as reported by `/heartbeat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatState {
    /// Serving requests.
    Available,
    /// Shutting down or refusing work.
    Down,
}

/// `/heartbeat` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: HeartbeatState,
    pub server_id: String,
}

/// `/get_status` response: the worker's own view of itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSelfStatus {
    pub worker_id: String,
    pub status: WorkerState,
    #[serde(default)]
    pub job_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Node surface
// ---------------------------------------------------------------------------

/// `/launch_worker` on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLaunchWorkerRequest {
    pub worker_type: String,
    pub worker_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_wire_format() {
        let response = HeartbeatResponse {
            status: HeartbeatState::Available,
            server_id: "w1".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"status": "available", "server_id": "w1"}));
    }

    #[test]
    fn test_completed_alert_defaults_output() {
        let request: WorkerAlertCompletedRequest = serde_json::from_value(json!({
            "job_id": "j1",
            "worker_id": "w1",
            "status": "completed",
        }))
        .unwrap();
        assert_eq!(request.output, Value::Null);
    }

    #[test]
    fn test_connect_request_round_trip() {
        let request = ConnectToClusterRequest {
            backend_args: ConsumerArgs::Redis {
                url: "redis://localhost:6379/0".to_string(),
            },
            queue_name: "echo".to_string(),
            cluster_url: "http://localhost:8000".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        let restored: ConnectToClusterRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.queue_name, "echo");
        assert_eq!(restored.backend_args, request.backend_args);
    }
}
