//! # Tessera Cluster
//!
//! The cluster manager: admission and routing of submitted jobs, job and
//! worker status stores, the worker-type registry, node registration, and
//! the HTTP RPC surface everything else talks to.
//!
//! Jobs are routed per their schema name: either proxied synchronously to
//! a registered HTTP endpoint, or published to the orchestrator queue a
//! worker consumes. Workers report lifecycle transitions back through the
//! `worker_alert_*` operations.

pub mod client;
pub mod error;
pub mod handles;
pub mod manager;
pub mod router;
pub mod rpc;
pub mod store;
pub mod types;

pub use client::ClusterClient;
pub use error::{ClusterError, ClusterResult};
pub use handles::{NodeHandle, WorkerHandle};
pub use manager::{ClusterManager, ClusterManagerConfig};
pub use router::cluster_router;
pub use store::{ClusterStores, MemoryStores, RedisStores};
pub use types::{
    JobState, JobStatus, JobTargeting, NodeRecord, WorkerAutoConnect, WorkerState, WorkerStatus,
    ORCHESTRATOR_TARGET,
};
