//! Redis-backed queue backend.
//!
//! Queues live under `queue:<name>`; the declared queue set is shared
//! through the `queue_metadata` hash and kept in sync across client
//! processes by declare/delete events on the `queue_events` pub/sub
//! channel. Mutations take the `queue_lock` distributed lock.

mod client;
mod lock;

pub use client::RedisClient;
pub use lock::DistributedLock;

use crate::error::{JobsError, JobsResult};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Centralised metadata hash: queue name → queue type.
pub const METADATA_KEY: &str = "queue_metadata";

/// Pub/sub channel for queue declare/delete events.
pub const EVENTS_CHANNEL: &str = "queue_events";

/// Distributed lock guarding queue-set mutations.
pub const LOCK_KEY: &str = "queue_lock";

/// Key of a queue's backing list or sorted set.
pub fn queue_key(queue_name: &str) -> String {
    format!("queue:{}", queue_name)
}

/// Key of a priority queue's insertion-order counter.
pub fn seq_key(queue_name: &str) -> String {
    format!("queue:{}:seq", queue_name)
}

/// Create a Redis connection pool and verify connectivity.
pub async fn create_pool(url: &str, pool_size: usize) -> JobsResult<Pool> {
    let cfg = Config::from_url(url);

    let pool = cfg
        .builder()
        .map_err(|e| JobsError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobsError::Configuration(format!("Failed to create pool: {}", e)))?;

    let mut conn = pool.get().await?;
    ::redis::cmd("PING")
        .query_async::<String>(&mut *conn)
        .await?;

    info!("Redis queue connection pool created");

    Ok(pool)
}
