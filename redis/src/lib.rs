//! Redis-backed [`KeyValueStore`].
//!
//! Shared by the gateway (rate-limit counters) and the post service (cache
//! entries). One [`ConnectionManager`] per process; it reconnects on its own
//! after a dropped connection.
//!
//! # Atomic windowed counter
//!
//! [`KeyValueStore::increment_with_expiry`] runs as a single Lua script so the
//! increment and the expiry can never be split by a crash or a concurrent
//! request:
//!
//! 1. `INCR key`
//! 2. on the first increment, `PEXPIRE key window`
//! 3. `PTTL key`; a counter that somehow lost its expiry gets it back
//!
//! # Pattern deletion
//!
//! [`KeyValueStore::delete_matching`] walks the keyspace with `SCAN MATCH`
//! cursors and deletes each batch. It never issues `KEYS` or `FLUSH*`.

use async_trait::async_trait;
use chirp_core::store::{KeyValueStore, KvError, WindowCount};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::sync::Arc;
use std::time::Duration;

const COUNTER_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

fn backend(context: &str) -> impl Fn(redis::RedisError) -> KvError + '_ {
    move |e| KvError::Backend(format!("{context}: {e}"))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// `Redis`-based key-value store.
///
/// # Example
///
/// ```no_run
/// use chirp_redis::RedisKeyValueStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let kv = RedisKeyValueStore::connect("redis://127.0.0.1:6379").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn_manager: ConnectionManager,
    counter_script: Arc<Script>,
}

impl std::fmt::Debug for RedisKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKeyValueStore").finish_non_exhaustive()
    }
}

impl RedisKeyValueStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Backend`] if the URL is invalid or the first
    /// connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = Client::open(redis_url).map_err(backend("Failed to create Redis client"))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(backend("Failed to create Redis connection manager"))?;

        tracing::info!("Connected to Redis");
        Ok(Self {
            conn_manager,
            counter_script: Arc::new(Script::new(COUNTER_SCRIPT)),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn_manager.clone();
        conn.get(key).await.map_err(backend("GET failed"))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend("SET failed"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn_manager.clone();
        let removed: u64 = conn.del(key).await.map_err(backend("DEL failed"))?;
        Ok(removed > 0)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError> {
        let mut conn = self.conn_manager.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend("SCAN failed"))?;

            if !keys.is_empty() {
                let batch: u64 = conn.del(&keys).await.map_err(backend("DEL failed"))?;
                removed += batch;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(pattern, removed, "Deleted matching keys");
        Ok(removed)
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, KvError> {
        let mut conn = self.conn_manager.clone();
        let (count, ttl_ms): (u64, i64) = self
            .counter_script
            .key(key)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key, "Counter script failed");
                KvError::Backend(format!("Counter script failed: {e}"))
            })?;

        let resets_in = u64::try_from(ttl_ms)
            .map(Duration::from_millis)
            .map_err(|_| KvError::UnexpectedResponse(format!("negative TTL {ttl_ms} for {key}")))?;

        Ok(WindowCount { count, resets_in })
    }
}
