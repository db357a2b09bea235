//! Status and routing stores.
//!
//! Each store is keyed by its natural key and upserts with last-writer-wins
//! semantics. `find` methods return every matching row so the manager can
//! enforce the exactly-one invariants itself.

mod memory;
mod redis;

pub use memory::MemoryStores;
pub use redis::RedisStores;

use crate::error::ClusterResult;
use crate::types::{JobStatus, JobTargeting, NodeRecord, WorkerAutoConnect, WorkerStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Keyed store of per-job lifecycle records.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Insert or replace the record for `status.job_id`.
    async fn upsert(&self, status: &JobStatus) -> ClusterResult<()>;

    /// Every record with the given job id (at most one in a healthy store).
    async fn find_by_job_id(&self, job_id: &str) -> ClusterResult<Vec<JobStatus>>;

    /// Delete every record, returning how many were removed.
    async fn clear(&self) -> ClusterResult<u64>;
}

/// Keyed store of worker lifecycle records.
#[async_trait]
pub trait WorkerStatusStore: Send + Sync {
    /// Insert or replace the record for `status.worker_id`.
    async fn upsert(&self, status: &WorkerStatus) -> ClusterResult<()>;

    /// Every record with the given worker id.
    async fn find_by_worker_id(&self, worker_id: &str) -> ClusterResult<Vec<WorkerStatus>>;

    /// Every record with the given worker URL.
    async fn find_by_url(&self, worker_url: &str) -> ClusterResult<Vec<WorkerStatus>>;

    /// Every record.
    async fn all(&self) -> ClusterResult<Vec<WorkerStatus>>;

    /// Delete every record, returning how many were removed.
    async fn clear(&self) -> ClusterResult<u64>;
}

/// Routing table store. At most one entry exists per schema name; setting
/// an entry removes any prior entry for that schema first.
#[async_trait]
pub trait TargetingStore: Send + Sync {
    /// Replace the entry for `targeting.schema_name`.
    async fn set(&self, targeting: &JobTargeting) -> ClusterResult<()>;

    /// The entry for a schema, if any.
    async fn get(&self, schema_name: &str) -> ClusterResult<Option<JobTargeting>>;

    /// All routing entries.
    async fn all(&self) -> ClusterResult<Vec<JobTargeting>>;

    /// Delete every entry, returning how many were removed.
    async fn clear(&self) -> ClusterResult<u64>;
}

/// Store of worker-type → schema auto-connect bindings.
#[async_trait]
pub trait AutoConnectStore: Send + Sync {
    /// Add a binding (duplicates are collapsed).
    async fn insert(&self, entry: &WorkerAutoConnect) -> ClusterResult<()>;

    /// Every binding for a worker type.
    async fn find_by_worker_type(&self, worker_type: &str) -> ClusterResult<Vec<WorkerAutoConnect>>;

    /// Delete every binding, returning how many were removed.
    async fn clear(&self) -> ClusterResult<u64>;
}

/// Store of registered node agents.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Record a node (re-registration is a no-op).
    async fn insert(&self, node: &NodeRecord) -> ClusterResult<()>;

    /// All registered nodes.
    async fn all(&self) -> ClusterResult<Vec<NodeRecord>>;

    /// Delete every node, returning how many were removed.
    async fn clear(&self) -> ClusterResult<u64>;
}

/// The cluster manager's full set of stores.
#[derive(Clone)]
pub struct ClusterStores {
    /// Per-job lifecycle records.
    pub job_status: Arc<dyn JobStatusStore>,
    /// Per-worker lifecycle records.
    pub worker_status: Arc<dyn WorkerStatusStore>,
    /// Routing table.
    pub targeting: Arc<dyn TargetingStore>,
    /// Worker-type auto-connect bindings.
    pub auto_connect: Arc<dyn AutoConnectStore>,
    /// Registered nodes.
    pub nodes: Arc<dyn NodeStore>,
}

impl ClusterStores {
    /// In-memory stores for tests and single-process deployments.
    pub fn memory() -> Self {
        MemoryStores::build()
    }

    /// Redis-backed stores under the given key prefix.
    pub fn redis(pool: deadpool_redis::Pool, key_prefix: impl Into<String>) -> Self {
        RedisStores::build(pool, key_prefix)
    }
}
