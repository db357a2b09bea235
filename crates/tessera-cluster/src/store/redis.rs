//! Redis-backed store implementations.
//!
//! Each store is one hash under the configured prefix, field = natural
//! key, value = JSON row. HSET gives the per-row upsert atomicity the
//! manager relies on; DEL clears a whole store.

use super::{
    AutoConnectStore, ClusterStores, JobStatusStore, NodeStore, TargetingStore, WorkerStatusStore,
};
use crate::error::ClusterResult;
use crate::types::{JobStatus, JobTargeting, NodeRecord, WorkerAutoConnect, WorkerStatus};
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory for a full set of Redis-backed stores.
pub struct RedisStores;

impl RedisStores {
    /// Builds all five stores over one pool.
    pub fn build(pool: Pool, key_prefix: impl Into<String>) -> ClusterStores {
        let prefix = key_prefix.into();
        ClusterStores {
            job_status: Arc::new(RedisHashStore::new(
                pool.clone(),
                format!("{}:jobstatus", prefix),
            )),
            worker_status: Arc::new(RedisHashStore::new(
                pool.clone(),
                format!("{}:workerstatus", prefix),
            )),
            targeting: Arc::new(RedisHashStore::new(
                pool.clone(),
                format!("{}:targeting", prefix),
            )),
            auto_connect: Arc::new(RedisHashStore::new(
                pool.clone(),
                format!("{}:autoconnect", prefix),
            )),
            nodes: Arc::new(RedisHashStore::new(pool, format!("{}:nodes", prefix))),
        }
    }
}

/// One hash of JSON rows.
struct RedisHashStore {
    pool: Pool,
    key: String,
}

impl RedisHashStore {
    fn new(pool: Pool, key: String) -> Self {
        Self { pool, key }
    }

    async fn set_row<T: serde::Serialize>(&self, field: &str, row: &T) -> ClusterResult<()> {
        let mut conn = self.pool.get().await?;
        let body = serde_json::to_string(row)?;
        let _: () = conn.hset(&self.key, field, body).await?;
        Ok(())
    }

    async fn get_row<T: serde::de::DeserializeOwned>(
        &self,
        field: &str,
    ) -> ClusterResult<Option<T>> {
        let mut conn = self.pool.get().await?;
        let body: Option<String> = conn.hget(&self.key, field).await?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn all_rows<T: serde::de::DeserializeOwned>(&self) -> ClusterResult<Vec<T>> {
        let mut conn = self.pool.get().await?;
        let rows: HashMap<String, String> = conn.hgetall(&self.key).await?;
        rows.values()
            .map(|body| serde_json::from_str(body).map_err(Into::into))
            .collect()
    }

    async fn clear_all(&self) -> ClusterResult<u64> {
        let mut conn = self.pool.get().await?;
        let count: u64 = conn.hlen(&self.key).await?;
        let _: () = conn.del(&self.key).await?;
        Ok(count)
    }
}

#[async_trait]
impl JobStatusStore for RedisHashStore {
    async fn upsert(&self, status: &JobStatus) -> ClusterResult<()> {
        self.set_row(&status.job_id, status).await
    }

    async fn find_by_job_id(&self, job_id: &str) -> ClusterResult<Vec<JobStatus>> {
        Ok(self.get_row(job_id).await?.into_iter().collect())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        self.clear_all().await
    }
}

#[async_trait]
impl WorkerStatusStore for RedisHashStore {
    async fn upsert(&self, status: &WorkerStatus) -> ClusterResult<()> {
        self.set_row(&status.worker_id, status).await
    }

    async fn find_by_worker_id(&self, worker_id: &str) -> ClusterResult<Vec<WorkerStatus>> {
        Ok(self.get_row(worker_id).await?.into_iter().collect())
    }

    async fn find_by_url(&self, worker_url: &str) -> ClusterResult<Vec<WorkerStatus>> {
        let rows: Vec<WorkerStatus> = self.all_rows().await?;
        Ok(rows
            .into_iter()
            .filter(|status| status.worker_url == worker_url)
            .collect())
    }

    async fn all(&self) -> ClusterResult<Vec<WorkerStatus>> {
        self.all_rows().await
    }

    async fn clear(&self) -> ClusterResult<u64> {
        self.clear_all().await
    }
}

#[async_trait]
impl TargetingStore for RedisHashStore {
    async fn set(&self, targeting: &JobTargeting) -> ClusterResult<()> {
        // HSET replaces the field, which is exactly the delete-then-insert
        // the routing table requires.
        self.set_row(&targeting.schema_name, targeting).await
    }

    async fn get(&self, schema_name: &str) -> ClusterResult<Option<JobTargeting>> {
        self.get_row(schema_name).await
    }

    async fn all(&self) -> ClusterResult<Vec<JobTargeting>> {
        self.all_rows().await
    }

    async fn clear(&self) -> ClusterResult<u64> {
        self.clear_all().await
    }
}

#[async_trait]
impl AutoConnectStore for RedisHashStore {
    async fn insert(&self, entry: &WorkerAutoConnect) -> ClusterResult<()> {
        let field = format!("{}:{}", entry.worker_type, entry.schema_name);
        self.set_row(&field, entry).await
    }

    async fn find_by_worker_type(
        &self,
        worker_type: &str,
    ) -> ClusterResult<Vec<WorkerAutoConnect>> {
        let rows: Vec<WorkerAutoConnect> = self.all_rows().await?;
        Ok(rows
            .into_iter()
            .filter(|entry| entry.worker_type == worker_type)
            .collect())
    }

    async fn clear(&self) -> ClusterResult<u64> {
        self.clear_all().await
    }
}

#[async_trait]
impl NodeStore for RedisHashStore {
    async fn insert(&self, node: &NodeRecord) -> ClusterResult<()> {
        self.set_row(&node.node_url, node).await
    }

    async fn all(&self) -> ClusterResult<Vec<NodeRecord>> {
        self.all_rows().await
    }

    async fn clear(&self) -> ClusterResult<u64> {
        self.clear_all().await
    }
}
