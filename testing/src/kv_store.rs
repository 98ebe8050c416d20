//! In-memory key-value store with clock-driven expiry.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use async_trait::async_trait;
use chirp_core::environment::Clock;
use chirp_core::glob;
use chirp_core::store::{KeyValueStore, KvError, WindowCount};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    unavailable: bool,
}

/// In-memory [`KeyValueStore`].
///
/// Expiry is evaluated against the injected clock, so tests can step time
/// with a `ManualClock` instead of sleeping.
#[derive(Clone)]
pub struct InMemoryKeyValueStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyValueStore")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl InMemoryKeyValueStore {
    /// Create an empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock: Arc::new(clock),
        }
    }

    /// Simulate the store going away (`true`) or coming back (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Live (unexpired) keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Whether a live entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// Remaining time to live of a live entry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(key)
            .and_then(|e| (e.expires_at - now).to_std().ok())
            .filter(|d| !d.is_zero())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Inner>, KvError> {
        let inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(KvError::Backend("in-memory store marked unavailable".to_string()));
        }
        Ok(inner)
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let expires_at = self.expiry(ttl);
        self.guard()?.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let now = self.clock.now();
        Ok(self
            .guard()?
            .entries
            .remove(key)
            .is_some_and(|e| e.expires_at > now))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        let mut live_removed = 0_u64;
        inner.entries.retain(|key, entry| {
            if glob::matches(pattern, key) {
                if entry.expires_at > now {
                    live_removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(live_removed)
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, KvError> {
        let now = self.clock.now();
        let fresh_expiry = self.expiry(window);
        let mut inner = self.guard()?;

        let entry = inner
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    e.value = "0".to_string();
                    e.expires_at = fresh_expiry;
                }
            })
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: fresh_expiry,
            });

        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| KvError::UnexpectedResponse(format!("{key} is not a counter")))?
            + 1;
        entry.value = count.to_string();

        Ok(WindowCount {
            count,
            resets_in: (entry.expires_at - now).to_std().unwrap_or(Duration::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::manual_clock;

    #[tokio::test]
    async fn entries_expire_with_the_clock() {
        let clock = manual_clock();
        let kv = InMemoryKeyValueStore::new(clock.clone());
        kv.set_with_ttl("post:1", "x", Duration::from_secs(10)).await.unwrap();
        assert_eq!(kv.get("post:1").await.unwrap().as_deref(), Some("x"));

        clock.advance(Duration::from_secs(10));
        assert_eq!(kv.get("post:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_matching_only_touches_matches() {
        let kv = InMemoryKeyValueStore::new(manual_clock());
        for key in ["posts:1:10", "posts:2:10", "post:abc"] {
            kv.set_with_ttl(key, "v", Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(kv.delete_matching("posts:*").await.unwrap(), 2);
        assert_eq!(kv.keys(), vec!["post:abc"]);
    }

    #[tokio::test]
    async fn counters_reset_after_their_window() {
        let clock = manual_clock();
        let kv = InMemoryKeyValueStore::new(clock.clone());
        let window = Duration::from_secs(60);

        assert_eq!(kv.increment_with_expiry("rl", window).await.unwrap().count, 1);
        clock.advance(Duration::from_secs(20));
        let second = kv.increment_with_expiry("rl", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.resets_in, Duration::from_secs(40));

        clock.advance(Duration::from_secs(40));
        assert_eq!(kv.increment_with_expiry("rl", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let kv = InMemoryKeyValueStore::new(manual_clock());
        kv.set_unavailable(true);
        assert!(kv.get("x").await.is_err());
    }
}
