//! Distributed lock over a single Redis key.

use crate::error::{JobsError, JobsResult};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Lock TTL. A holder that dies releases the lock after this long.
const LOCK_TTL: Duration = Duration::from_secs(5);

/// How long acquisition retries before giving up.
const ACQUIRE_WAIT: Duration = Duration::from_secs(5);

/// Retry interval while the lock is held elsewhere.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// A held distributed lock. Release is compare-and-delete on the fencing
/// token, so an expired lock is never released out from under a new holder.
pub struct DistributedLock {
    key: String,
    token: String,
}

impl DistributedLock {
    /// Acquires the lock, retrying up to the acquisition window.
    pub async fn acquire(
        conn: &mut deadpool_redis::Connection,
        key: &str,
    ) -> JobsResult<DistributedLock> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + ACQUIRE_WAIT;

        loop {
            let acquired: Option<String> = ::redis::cmd("SET")
                .arg(key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL.as_millis() as u64)
                .query_async(&mut **conn)
                .await?;

            if acquired.is_some() {
                debug!(key = key, "Acquired distributed lock");
                return Ok(DistributedLock {
                    key: key.to_string(),
                    token,
                });
            }

            if Instant::now() >= deadline {
                return Err(JobsError::LockUnavailable(key.to_string()));
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Releases the lock if this holder still owns it.
    pub async fn release(self, conn: &mut deadpool_redis::Connection) -> JobsResult<()> {
        let released: i64 = ::redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut **conn)
            .await?;

        if released == 0 {
            debug!(key = %self.key, "Lock expired before release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_constants() {
        assert_eq!(LOCK_TTL, Duration::from_secs(5));
        assert!(RETRY_INTERVAL < LOCK_TTL);
    }
}
