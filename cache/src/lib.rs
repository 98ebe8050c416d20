//! # Chirp Cache
//!
//! Read-through cache in front of the post store.
//!
//! ```text
//!  read_through(key)
//!        │
//!        ▼
//!   ┌─────────┐  hit    ┌──────────────┐
//!   │  get    │───────► │ deserialize  │──► value
//!   └────┬────┘         └──────────────┘
//!        │ miss / cache error / corrupt entry
//!        ▼
//!   ┌─────────┐  Some   ┌──────────────┐
//!   │ loader  │───────► │ set with TTL │──► value
//!   └────┬────┘         └──────────────┘
//!        │ None (never cached)
//!        ▼
//!      None
//! ```
//!
//! # Key namespace
//!
//! | Key | Value | TTL |
//! |---|---|---|
//! | `posts:<page>:<limit>` | one listing page | 300 s |
//! | `post:<id>` | one post | 3600 s |
//!
//! # Invalidation
//!
//! [`CacheManager::invalidate_post`] deletes `post:<id>` and every `posts:*`
//! key. The post service calls it after each write and before publishing the
//! corresponding event. A failed invalidation leaves stale entries that expire
//! with their TTL.

use chirp_core::ids::PostId;
use chirp_core::store::{KeyValueStore, KvError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Glob matching every listing key.
pub const LIST_KEY_PATTERN: &str = "posts:*";

/// Cache key for one listing page.
#[must_use]
pub fn list_key(page: u64, limit: u64) -> String {
    format!("posts:{page}:{limit}")
}

/// Cache key for one post.
#[must_use]
pub fn post_key(id: PostId) -> String {
    format!("post:{id}")
}

/// Errors from cache invalidation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key-value store failed
    #[error("Cache backend error: {0}")]
    Backend(#[from] KvError),
}

/// TTLs for the two key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for `posts:<page>:<limit>` entries.
    pub list_ttl: Duration,
    /// TTL for `post:<id>` entries.
    pub entity_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl: Duration::from_secs(300),
            entity_ttl: Duration::from_secs(3600),
        }
    }
}

/// Read-through cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct CacheManager {
    kv: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Create a cache manager.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    /// TTL configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached value for `key`, or run `loader`, cache a found
    /// value for `ttl` and return it.
    ///
    /// Cache failures never fail the read: a read error, or an entry that no
    /// longer deserializes, is treated as a miss, and a write error is logged.
    /// A `None` from the loader is not cached.
    ///
    /// # Errors
    ///
    /// Returns the loader's error unchanged.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let namespace = namespace_of(key);

        match self.kv.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    metrics::counter!("cache.hits", "namespace" => namespace).increment(1);
                    debug!(key, "Cache hit");
                    return Ok(Some(value));
                }
                Err(e) => warn!(key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Cache read failed, falling back to store"),
        }

        metrics::counter!("cache.misses", "namespace" => namespace).increment(1);
        let value = loader().await?;

        if let Some(found) = &value {
            self.put(key, found, ttl).await;
        }
        Ok(value)
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Value not cacheable");
                return;
            }
        };
        if let Err(e) = self.kv.set_with_ttl(key, &raw, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Remove `post:<id>` and every listing page.
    ///
    /// Both deletes are always attempted; a failure of the entity delete
    /// does not leave stale listing pages behind. Returns the number of
    /// keys removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] with the first failure if either
    /// delete fails.
    pub async fn invalidate_post(&self, id: PostId) -> Result<u64, CacheError> {
        let entity = self.kv.delete(&post_key(id)).await;
        let lists = self.kv.delete_matching(LIST_KEY_PATTERN).await;
        let removed = u64::from(entity?) + lists?;
        debug!(post_id = %id, removed, "Invalidated post cache");
        Ok(removed)
    }
}

fn namespace_of(key: &str) -> &'static str {
    match key.split_once(':').map(|(prefix, _)| prefix) {
        Some("posts") => "posts",
        Some("post") => "post",
        _ => "other",
    }
}
