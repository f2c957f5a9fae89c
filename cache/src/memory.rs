use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use common::error::Res;
use dashmap::DashMap;
use serde_json::Value;

use crate::CacheStore;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Bounded process-local cache.
///
/// When full, expired entries are purged first and then the entry closest to
/// expiry is evicted.
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        MemoryCacheStore {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now) {
                return Some(entry.payload.clone());
            }
        }
        // the read guard must be dropped before removing
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    pub fn put_at(&self, key: String, payload: Value, ttl: Duration, now: DateTime<Utc>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }

        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                expires_at,
            },
        );
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self, now: DateTime<Utc>) {
        if self.sweep_at(now) > 0 && self.entries.len() < self.max_entries {
            return;
        }
        let soonest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = soonest {
            log::debug!("Cache full, evicting {}", key);
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Res<Option<Value>> {
        Ok(self.get_at(key, Utc::now()))
    }

    async fn put(&self, key: String, payload: Value, ttl: Duration) -> Res<()> {
        self.put_at(key, payload, ttl, Utc::now());
        Ok(())
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }
}
