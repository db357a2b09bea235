//! Cluster data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sentinel targeting value routing a schema through the orchestrator.
pub const ORCHESTRATOR_TARGET: &str = "@orchestrator";

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted and waiting for a worker or endpoint.
    #[default]
    Queued,
    /// A worker has picked the job up.
    Running,
    /// Finished successfully.
    Completed,
    /// The worker's user logic failed.
    Failed,
    /// The cluster could not route or process the job.
    Error,
}

impl JobState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Error => write!(f, "error"),
        }
    }
}

/// Mutable lifecycle record of a submitted job.
///
/// Exactly one exists per accepted job; only the cluster manager mutates
/// it, with last-writer-wins semantics per `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// The job this record tracks.
    pub job_id: String,

    /// Current lifecycle state.
    pub status: JobState,

    /// Job output; empty object until completion.
    #[serde(default)]
    pub output: Value,

    /// Worker currently (or last) assigned, empty when none.
    #[serde(default)]
    pub worker_id: String,
}

impl JobStatus {
    /// A freshly accepted job.
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Queued,
            output: Value::Object(Default::default()),
            worker_id: String::new(),
        }
    }
}

/// Lifecycle state of a worker, as the cluster sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Connected and waiting for work.
    #[default]
    Idle,
    /// Processing a job.
    Running,
    /// Reported an error.
    Error,
    /// Shut down deliberately.
    Shutdown,
    /// Unknown to the cluster, or unreachable at last probe.
    Nonexistent,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Error => write!(f, "error"),
            WorkerState::Shutdown => write!(f, "shutdown"),
            WorkerState::Nonexistent => write!(f, "nonexistent"),
        }
    }
}

/// Cluster-side view of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Worker id, as reported by the worker itself.
    pub worker_id: String,

    /// Registered worker type, empty when launched out-of-band.
    #[serde(default)]
    pub worker_type: String,

    /// URL of the worker's RPC surface.
    #[serde(default)]
    pub worker_url: String,

    /// Current state.
    pub status: WorkerState,

    /// Job currently being processed, if running.
    #[serde(default)]
    pub job_id: Option<String>,

    /// When the cluster last heard from the worker.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl WorkerStatus {
    /// The synthetic record returned for workers the cluster has never
    /// seen (status queries never raise on a miss).
    pub fn nonexistent(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_type: String::new(),
            worker_url: String::new(),
            status: WorkerState::Nonexistent,
            job_id: None,
            last_heartbeat: None,
        }
    }
}

/// Routing table entry: schema name → HTTP path or [`ORCHESTRATOR_TARGET`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTargeting {
    /// Schema this entry routes. At most one entry exists per schema.
    pub schema_name: String,

    /// Either an HTTP path relative to the cluster base URL, or the
    /// orchestrator sentinel.
    pub target_endpoint: String,
}

impl JobTargeting {
    /// Routes `schema_name` through the orchestrator.
    pub fn orchestrator(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            target_endpoint: ORCHESTRATOR_TARGET.to_string(),
        }
    }

    /// Routes `schema_name` to an HTTP endpoint.
    pub fn endpoint(schema_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            target_endpoint: endpoint.into(),
        }
    }

    /// True when this entry routes through the orchestrator.
    pub fn is_orchestrator(&self) -> bool {
        self.target_endpoint == ORCHESTRATOR_TARGET
    }
}

/// Binds a worker type to a schema: launching such a worker auto-registers
/// the schema for orchestrator routing against the new worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAutoConnect {
    /// Worker type the binding applies to.
    pub worker_type: String,

    /// Schema bound to workers of that type.
    pub schema_name: String,
}

/// A registered node agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// URL of the node's RPC surface.
    pub node_url: String,
}
