use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::error::Res;
use serde_json::{Map, Value};
use url::form_urlencoded;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;

/// TTL store for upstream JSON payloads.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the payload if the entry exists and has not expired.
    async fn get(&self, key: &str) -> Res<Option<Value>>;

    async fn put(&self, key: String, payload: Value, ttl: Duration) -> Res<()>;

    /// Drops expired entries and returns how many were removed.
    fn sweep(&self) -> usize {
        0
    }
}

/// Serves `key` from the cache, or runs `fetch` and caches its successful result.
///
/// Failed fetches are returned as-is and leave the cache untouched. A failing
/// cache backend is logged and treated as a miss.
pub async fn get_or_fetch<F, Fut>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Res<Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Res<Value>>,
{
    match store.get(key).await {
        Ok(Some(payload)) => {
            log::debug!("Cache hit for {}", key);
            return Ok(payload);
        }
        Ok(None) => {}
        Err(e) => log::warn!("Cache read failed for {}: {}", key, e),
    }

    let payload = fetch().await?;
    if let Err(e) = store.put(key.to_string(), payload.clone(), ttl).await {
        log::warn!("Cache write failed for {}: {}", key, e);
    }
    Ok(payload)
}

/// Canonical key of a lookup: the same parameters in any order map to the same key.
pub fn cache_key(provider: &str, endpoint: &str, params: &Map<String, Value>) -> String {
    let mut pairs: Vec<(&String, String)> = params
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name, value)
        })
        .collect();
    pairs.sort();

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{}:{}?{}", provider, endpoint.trim_matches('/'), query)
}

/// Periodically removes expired entries from the store.
pub fn spawn_sweeper(store: Arc<dyn CacheStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                log::debug!("Swept {} expired cache entries", removed);
            }
        }
    });
}
