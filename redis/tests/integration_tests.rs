//! Integration tests against a real Redis.
//!
//! Run with: `REDIS_URL=redis://127.0.0.1:6379 cargo test -p chirp-redis -- --ignored`

#![allow(clippy::unwrap_used)]

use chirp_core::store::KeyValueStore;
use chirp_redis::RedisKeyValueStore;
use std::time::Duration;

async fn store() -> RedisKeyValueStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    RedisKeyValueStore::connect(&url).await.unwrap()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}:{}", std::process::id())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn set_get_and_delete() {
    let kv = store().await;
    let key = unique("test-post");
    kv.set_with_ttl(&key, "hello", Duration::from_secs(30)).await.unwrap();
    assert_eq!(kv.get(&key).await.unwrap().as_deref(), Some("hello"));
    assert!(kv.delete(&key).await.unwrap());
    assert_eq!(kv.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn scan_deletes_only_matching_keys() {
    let kv = store().await;
    let prefix = unique("test-posts");
    for page in 1..=5 {
        kv.set_with_ttl(&format!("{prefix}:{page}:10"), "[]", Duration::from_secs(30))
            .await
            .unwrap();
    }
    let keep = unique("test-keep");
    kv.set_with_ttl(&keep, "x", Duration::from_secs(30)).await.unwrap();

    assert_eq!(kv.delete_matching(&format!("{prefix}:*")).await.unwrap(), 5);
    assert!(kv.get(&keep).await.unwrap().is_some());
    kv.delete(&keep).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn counter_expiry_is_set_once() {
    let kv = store().await;
    let key = unique("test-counter");
    let window = Duration::from_secs(60);

    let first = kv.increment_with_expiry(&key, window).await.unwrap();
    let second = kv.increment_with_expiry(&key, window).await.unwrap();

    assert_eq!((first.count, second.count), (1, 2));
    assert!(second.resets_in <= window);
    assert!(second.resets_in > Duration::from_secs(55));
    kv.delete(&key).await.unwrap();
}
