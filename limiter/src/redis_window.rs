use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use common::{
    error::{AppError, Res},
    plans::Tier,
};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::{QuotaTable, RateDecision, RateLimiter};

/// Fixed-window limiter backed by Redis, shared by every server instance.
///
/// The first request of a window creates the counter with a TTL of one window;
/// the key expiring is the window reset.
pub struct RedisRateLimiter {
    scope: String,
    quotas: QuotaTable,
    pool: deadpool_redis::Pool,
}

impl RedisRateLimiter {
    pub fn new(scope: &str, quotas: QuotaTable, pool: deadpool_redis::Pool) -> Self {
        RedisRateLimiter {
            scope: scope.to_string(),
            quotas,
            pool,
        }
    }

    fn key(&self, user_id: Uuid, tier: Tier) -> String {
        window_key(&self.scope, user_id, tier)
    }
}

/// Reports whether a denied request's increment was undone. A failed rollback
/// overcounts the current window until it expires.
fn rolled_back(key: &str, result: redis::RedisResult<u64>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Failed to roll back rate limit counter {}: {}", key, e);
            false
        }
    }
}

pub(crate) fn window_key(scope: &str, user_id: Uuid, tier: Tier) -> String {
    format!("ratelimit:{}:{}:{}", scope, tier, user_id)
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_consume(&self, user_id: Uuid, tier: Tier) -> Res<RateDecision> {
        let quota = self.quotas.get(tier);
        let window_ms = quota.window.num_milliseconds();
        let key = self.key(user_id, tier);

        let mut conn = self.pool.get().await.map_err(|e| {
            AppError::Internal(format!("Failed to get Redis connection: {}", e))
        })?;

        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.pexpire(&key, window_ms).await?;
        }

        let mut ttl_ms: i64 = conn.pttl(&key).await?;
        if ttl_ms < 0 {
            // counter lost its expiry, start a fresh window
            let _: () = conn.pexpire(&key, window_ms).await?;
            ttl_ms = window_ms;
        }
        let reset_at = Utc::now() + TimeDelta::milliseconds(ttl_ms);
        let limit = quota.max_requests;

        if count > u64::from(limit) {
            rolled_back(&key, conn.decr(&key, 1).await);
            log::debug!("Quota exhausted for {} on '{}' ({})", user_id, self.scope, tier);
            return Ok(RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
            });
        }

        Ok(RateDecision {
            allowed: true,
            limit,
            remaining: limit - count as u32,
            reset_at,
        })
    }

    fn scope(&self) -> &str {
        &self.scope
    }
}
