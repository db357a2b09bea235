//! In-memory store implementations.

use super::{
    AutoConnectStore, ClusterStores, JobStatusStore, NodeStore, TargetingStore, WorkerStatusStore,
};
use crate::error::ClusterResult;
use crate::types::{JobStatus, JobTargeting, NodeRecord, WorkerAutoConnect, WorkerStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory for a full set of process-local stores.
pub struct MemoryStores;

impl MemoryStores {
    /// Builds all five stores.
    pub fn build() -> ClusterStores {
        ClusterStores {
            job_status: Arc::new(MemoryJobStatusStore::default()),
            worker_status: Arc::new(MemoryWorkerStatusStore::default()),
            targeting: Arc::new(MemoryTargetingStore::default()),
            auto_connect: Arc::new(MemoryAutoConnectStore::default()),
            nodes: Arc::new(MemoryNodeStore::default()),
        }
    }
}

#[derive(Default)]
struct MemoryJobStatusStore {
    rows: RwLock<HashMap<String, JobStatus>>,
}

#[async_trait]
impl JobStatusStore for MemoryJobStatusStore {
    async fn upsert(&self, status: &JobStatus) -> ClusterResult<()> {
        self.rows
            .write()
            .insert(status.job_id.clone(), status.clone());
        Ok(())
    }

    async fn find_by_job_id(&self, job_id: &str) -> ClusterResult<Vec<JobStatus>> {
        Ok(self.rows.read().get(job_id).cloned().into_iter().collect())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}

#[derive(Default)]
struct MemoryWorkerStatusStore {
    rows: RwLock<HashMap<String, WorkerStatus>>,
}

#[async_trait]
impl WorkerStatusStore for MemoryWorkerStatusStore {
    async fn upsert(&self, status: &WorkerStatus) -> ClusterResult<()> {
        self.rows
            .write()
            .insert(status.worker_id.clone(), status.clone());
        Ok(())
    }

    async fn find_by_worker_id(&self, worker_id: &str) -> ClusterResult<Vec<WorkerStatus>> {
        Ok(self
            .rows
            .read()
            .get(worker_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn find_by_url(&self, worker_url: &str) -> ClusterResult<Vec<WorkerStatus>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|status| status.worker_url == worker_url)
            .cloned()
            .collect())
    }

    async fn all(&self) -> ClusterResult<Vec<WorkerStatus>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}

#[derive(Default)]
struct MemoryTargetingStore {
    rows: RwLock<HashMap<String, JobTargeting>>,
}

#[async_trait]
impl TargetingStore for MemoryTargetingStore {
    async fn set(&self, targeting: &JobTargeting) -> ClusterResult<()> {
        let mut rows = self.rows.write();
        rows.remove(&targeting.schema_name);
        rows.insert(targeting.schema_name.clone(), targeting.clone());
        Ok(())
    }

    async fn get(&self, schema_name: &str) -> ClusterResult<Option<JobTargeting>> {
        Ok(self.rows.read().get(schema_name).cloned())
    }

    async fn all(&self) -> ClusterResult<Vec<JobTargeting>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}

#[derive(Default)]
struct MemoryAutoConnectStore {
    rows: RwLock<Vec<WorkerAutoConnect>>,
}

#[async_trait]
impl AutoConnectStore for MemoryAutoConnectStore {
    async fn insert(&self, entry: &WorkerAutoConnect) -> ClusterResult<()> {
        let mut rows = self.rows.write();
        if !rows.contains(entry) {
            rows.push(entry.clone());
        }
        Ok(())
    }

    async fn find_by_worker_type(
        &self,
        worker_type: &str,
    ) -> ClusterResult<Vec<WorkerAutoConnect>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|entry| entry.worker_type == worker_type)
            .cloned()
            .collect())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}

#[derive(Default)]
struct MemoryNodeStore {
    rows: RwLock<Vec<NodeRecord>>,
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn insert(&self, node: &NodeRecord) -> ClusterResult<()> {
        let mut rows = self.rows.write();
        if !rows.contains(node) {
            rows.push(node.clone());
        }
        Ok(())
    }

    async fn all(&self) -> ClusterResult<Vec<NodeRecord>> {
        Ok(self.rows.read().clone())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}
