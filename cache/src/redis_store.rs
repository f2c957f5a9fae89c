use std::time::Duration;

use async_trait::async_trait;
use common::error::{AppError, Res};
use redis::AsyncCommands;
use serde_json::Value;

use crate::CacheStore;

/// Cache shared by every server instance. Redis expires the keys itself.
pub struct RedisCacheStore {
    pool: deadpool_redis::Pool,
}

impl RedisCacheStore {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        RedisCacheStore { pool }
    }

    async fn connection(&self) -> Res<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

fn storage_key(key: &str) -> String {
    format!("cache:{}", key)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Res<Option<Value>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(storage_key(key)).await?;

        match raw {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                AppError::Internal(format!("Corrupt cache entry for {}: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    async fn put(&self, key: String, payload: Value, ttl: Duration) -> Res<()> {
        let mut conn = self.connection().await?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = conn
            .pset_ex(storage_key(&key), payload.to_string(), millis)
            .await?;
        Ok(())
    }
}
