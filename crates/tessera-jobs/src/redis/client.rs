//! Redis queue backend.

use super::{
    create_pool, queue_key, seq_key, DistributedLock, EVENTS_CHANNEL, LOCK_KEY, METADATA_KEY,
};
use crate::error::{JobsError, JobsResult};
use crate::job::Job;
use crate::queue::{ConsumerArgs, PublishOptions, QueueBackend, QueueKind};
use async_trait::async_trait;
use deadpool_redis::Pool;
use futures::StreamExt;
use parking_lot::RwLock;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Interval between claim attempts on a blocking priority pop.
const PRIORITY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Atomically claim the head of a priority queue (lowest score wins; the
/// score encodes negated priority plus insertion sequence).
const CLAIM_SCRIPT: &str = r#"
local item = redis.call('ZRANGE', KEYS[1], 0, 0)
if #item == 0 then
    return false
end
redis.call('ZREM', KEYS[1], item[1])
return item[1]
"#;

/// Queue declare/delete event published on `queue_events`.
#[derive(Debug, Serialize, Deserialize)]
struct QueueEvent {
    event: String,
    queue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_type: Option<String>,
}

/// Redis queue backend.
///
/// Each client process keeps a local cache of the declared queue set,
/// rebuilt from the `queue_metadata` hash at startup and kept current by a
/// background pub/sub subscriber, so peers converge without polling.
pub struct RedisClient {
    url: String,
    pool: Pool,
    queues: Arc<RwLock<HashMap<String, QueueKind>>>,
    shutdown: CancellationToken,
}

impl RedisClient {
    /// Connects to Redis, loads the declared queue set, and starts the
    /// event subscriber.
    pub async fn connect(url: &str, pool_size: usize) -> JobsResult<Self> {
        let pool = create_pool(url, pool_size).await?;

        let client = Self {
            url: url.to_string(),
            pool,
            queues: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        };

        client.load_queue_metadata().await?;
        client.start_event_listener()?;

        Ok(client)
    }

    /// Stops the background subscriber. Further queue operations still
    /// work but no longer observe declare/delete events from peers.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Rebuild the local queue cache from the shared metadata hash.
    async fn load_queue_metadata(&self) -> JobsResult<()> {
        let mut conn = self.pool.get().await?;
        let metadata: HashMap<String, String> = conn.hgetall(METADATA_KEY).await?;

        let mut queues = self.queues.write();
        queues.clear();
        for (name, kind) in metadata {
            match QueueKind::from_str(&kind) {
                Ok(kind) => {
                    queues.insert(name, kind);
                }
                Err(_) => warn!(queue = %name, kind = %kind, "Skipping queue with unknown type"),
            }
        }
        debug!(count = queues.len(), "Loaded queue metadata");
        Ok(())
    }

    /// Spawn the pub/sub subscriber that keeps the local cache in sync.
    fn start_event_listener(&self) -> JobsResult<()> {
        let client = ::redis::Client::open(self.url.as_str())?;
        let queues = self.queues.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    warn!(error = %e, "Queue event subscriber failed to connect");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(EVENTS_CHANNEL).await {
                warn!(error = %e, "Queue event subscription failed");
                return;
            }

            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Queue event subscriber stopped");
                        return;
                    }
                    message = stream.next() => {
                        let Some(message) = message else {
                            warn!("Queue event stream closed");
                            return;
                        };
                        let Ok(payload) = message.get_payload::<String>() else {
                            continue;
                        };
                        match serde_json::from_str::<QueueEvent>(&payload) {
                            Ok(event) => Self::apply_event(&queues, event),
                            Err(e) => warn!(error = %e, "Ignoring malformed queue event"),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    fn apply_event(queues: &RwLock<HashMap<String, QueueKind>>, event: QueueEvent) {
        match event.event.as_str() {
            "declare" => {
                let Some(kind) = event
                    .queue_type
                    .as_deref()
                    .and_then(|k| QueueKind::from_str(k).ok())
                else {
                    return;
                };
                queues.write().insert(event.queue, kind);
            }
            "delete" => {
                queues.write().remove(&event.queue);
            }
            other => debug!(event = other, "Ignoring unknown queue event"),
        }
    }

    /// Resolve a queue's kind, falling back to the shared metadata hash
    /// when the local cache has not yet converged.
    async fn kind_of(&self, queue_name: &str) -> JobsResult<QueueKind> {
        if let Some(kind) = self.queues.read().get(queue_name) {
            return Ok(*kind);
        }

        let mut conn = self.pool.get().await?;
        let stored: Option<String> = conn.hget(METADATA_KEY, queue_name).await?;
        match stored {
            Some(kind) => {
                let kind = QueueKind::from_str(&kind)?;
                self.queues.write().insert(queue_name.to_string(), kind);
                Ok(kind)
            }
            None => Err(JobsError::QueueNotFound(queue_name.to_string())),
        }
    }

    async fn publish_event(
        &self,
        conn: &mut deadpool_redis::Connection,
        event: QueueEvent,
    ) -> JobsResult<()> {
        let payload = serde_json::to_string(&event)?;
        let _: () = conn.publish(EVENTS_CHANNEL, payload).await?;
        Ok(())
    }

    /// Claim the highest-priority item, or `None` when the queue is empty.
    async fn claim_priority_item(&self, queue_name: &str) -> JobsResult<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let claimed: Option<Vec<u8>> = ::redis::Script::new(CLAIM_SCRIPT)
            .key(queue_key(queue_name))
            .invoke_async(&mut *conn)
            .await?;
        Ok(claimed)
    }
}

#[async_trait]
impl QueueBackend for RedisClient {
    async fn declare_queue(&self, queue_name: &str, kind: QueueKind) -> JobsResult<()> {
        if self.queues.read().contains_key(queue_name) {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;
        let lock = DistributedLock::acquire(&mut conn, LOCK_KEY).await?;

        let result: JobsResult<()> = async {
            let _: () = conn.hset(METADATA_KEY, queue_name, kind.to_string()).await?;
            self.queues.write().insert(queue_name.to_string(), kind);
            self.publish_event(
                &mut conn,
                QueueEvent {
                    event: "declare".to_string(),
                    queue: queue_name.to_string(),
                    queue_type: Some(kind.to_string()),
                },
            )
            .await
        }
        .await;

        lock.release(&mut conn).await?;
        result
    }

    async fn delete_queue(&self, queue_name: &str) -> JobsResult<()> {
        // Resolve first so deleting an undeclared queue errors.
        self.kind_of(queue_name).await?;

        let mut conn = self.pool.get().await?;
        let lock = DistributedLock::acquire(&mut conn, LOCK_KEY).await?;

        let result: JobsResult<()> = async {
            let _: () = conn.hdel(METADATA_KEY, queue_name).await?;
            let _: () = conn
                .del(&[queue_key(queue_name), seq_key(queue_name)])
                .await?;
            self.queues.write().remove(queue_name);
            self.publish_event(
                &mut conn,
                QueueEvent {
                    event: "delete".to_string(),
                    queue: queue_name.to_string(),
                    queue_type: None,
                },
            )
            .await
        }
        .await;

        lock.release(&mut conn).await?;
        result
    }

    async fn publish(
        &self,
        queue_name: &str,
        job: &Job,
        opts: PublishOptions,
    ) -> JobsResult<String> {
        let kind = self.kind_of(queue_name).await?;

        let mut job = job.clone();
        if job.needs_id() {
            job.id = Uuid::new_v4().to_string();
        }
        let job_id = job.id.clone();
        let body = serde_json::to_vec(&job)?;

        let mut conn = self.pool.get().await?;
        let key = queue_key(queue_name);

        match kind {
            QueueKind::Fifo | QueueKind::Stack => {
                let _: () = conn.lpush(&key, body).await?;
            }
            QueueKind::Priority => {
                let priority = opts.priority.unwrap_or(0);
                let seq: u64 = conn.incr(seq_key(queue_name), 1u64).await?;
                // Lowest score claims first: negate priority, add the
                // insertion sequence to keep equal priorities FIFO.
                let score = -(priority as f64) * 1e12 + seq as f64;
                let _: () = conn.zadd(&key, body, score).await?;
            }
        }

        Ok(job_id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        block: bool,
        timeout: Option<Duration>,
    ) -> JobsResult<Option<Job>> {
        let kind = self.kind_of(queue_name).await?;
        let key = queue_key(queue_name);

        let raw: Option<Vec<u8>> = match kind {
            QueueKind::Fifo => {
                let mut conn = self.pool.get().await?;
                if block {
                    let popped: Option<(String, Vec<u8>)> = conn
                        .brpop(&key, timeout.map(|t| t.as_secs_f64()).unwrap_or(0.0))
                        .await?;
                    popped.map(|(_, body)| body)
                } else {
                    conn.rpop(&key, None).await?
                }
            }
            QueueKind::Stack => {
                let mut conn = self.pool.get().await?;
                if block {
                    let popped: Option<(String, Vec<u8>)> = conn
                        .blpop(&key, timeout.map(|t| t.as_secs_f64()).unwrap_or(0.0))
                        .await?;
                    popped.map(|(_, body)| body)
                } else {
                    conn.lpop(&key, None).await?
                }
            }
            QueueKind::Priority => {
                if block {
                    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
                    loop {
                        if let Some(body) = self.claim_priority_item(queue_name).await? {
                            break Some(body);
                        }
                        if let Some(deadline) = deadline {
                            if tokio::time::Instant::now() >= deadline {
                                break None;
                            }
                        }
                        tokio::time::sleep(PRIORITY_POLL_INTERVAL).await;
                    }
                } else {
                    self.claim_priority_item(queue_name).await?
                }
            }
        };

        match raw {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    async fn count(&self, queue_name: &str) -> JobsResult<u64> {
        let kind = self.kind_of(queue_name).await?;
        let mut conn = self.pool.get().await?;
        let key = queue_key(queue_name);

        let count: u64 = match kind {
            QueueKind::Fifo | QueueKind::Stack => conn.llen(&key).await?,
            QueueKind::Priority => conn.zcard(&key).await?,
        };
        Ok(count)
    }

    async fn clean(&self, queue_name: &str) -> JobsResult<u64> {
        let count = self.count(queue_name).await?;

        let mut conn = self.pool.get().await?;
        let lock = DistributedLock::acquire(&mut conn, LOCK_KEY).await?;
        let result: JobsResult<()> = async {
            let _: () = conn.del(queue_key(queue_name)).await?;
            Ok(())
        }
        .await;
        lock.release(&mut conn).await?;

        result.map(|()| count)
    }

    fn consumer_args(&self) -> JobsResult<ConsumerArgs> {
        Ok(ConsumerArgs::Redis {
            url: self.url.clone(),
        })
    }
}

impl Drop for RedisClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_declare_event() {
        let queues = RwLock::new(HashMap::new());
        RedisClient::apply_event(
            &queues,
            QueueEvent {
                event: "declare".to_string(),
                queue: "echo".to_string(),
                queue_type: Some("priority".to_string()),
            },
        );
        assert_eq!(queues.read().get("echo"), Some(&QueueKind::Priority));
    }

    #[test]
    fn test_apply_delete_event() {
        let queues = RwLock::new(HashMap::from([("echo".to_string(), QueueKind::Fifo)]));
        RedisClient::apply_event(
            &queues,
            QueueEvent {
                event: "delete".to_string(),
                queue: "echo".to_string(),
                queue_type: None,
            },
        );
        assert!(queues.read().is_empty());
    }

    #[test]
    fn test_declare_event_without_type_is_ignored() {
        let queues = RwLock::new(HashMap::new());
        RedisClient::apply_event(
            &queues,
            QueueEvent {
                event: "declare".to_string(),
                queue: "echo".to_string(),
                queue_type: None,
            },
        );
        assert!(queues.read().is_empty());
    }

    #[test]
    fn test_priority_score_orders_by_priority_then_seq() {
        let score = |priority: i64, seq: u64| -(priority as f64) * 1e12 + seq as f64;

        // Higher priority sorts lower (claimed first).
        assert!(score(10, 5) < score(1, 1));
        // Equal priority: earlier insertion sorts lower.
        assert!(score(5, 1) < score(5, 2));
        // Negative priorities sort after everything non-negative.
        assert!(score(0, 1_000_000) < score(-1, 1));
    }
}
