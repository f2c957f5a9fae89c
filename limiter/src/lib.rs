use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{error::Res, plans::Tier};
use db::SubscriptionStore;
use middleware::{global::GlobalLimiter, user::UserRateLimiter};
use uuid::Uuid;

pub mod middleware {
    pub mod global;
    pub mod user;
}
pub mod quota;
pub mod redis_window;
pub mod window;

pub use quota::{Quota, QuotaTable};
pub use redis_window::RedisRateLimiter;
pub use window::FixedWindowLimiter;

/// Outcome of a single quota check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Per-user fixed-window quota check.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request against the user's window unless the quota is spent.
    async fn check_and_consume(&self, user_id: Uuid, tier: Tier) -> Res<RateDecision>;

    /// Drops expired windows and returns how many were removed.
    fn sweep(&self) -> usize {
        0
    }

    fn scope(&self) -> &str;
}

pub fn global_middleware(permits_per_second: u32) -> GlobalLimiter {
    GlobalLimiter::new(permits_per_second)
}

pub fn user_middleware(
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn SubscriptionStore>,
) -> UserRateLimiter {
    UserRateLimiter::new(limiter, store)
}

/// Periodically removes expired windows so idle users do not pin memory.
pub fn spawn_sweeper(limiter: Arc<dyn RateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                log::debug!(
                    "Swept {} expired rate limit windows from '{}'",
                    removed,
                    limiter.scope()
                );
            }
        }
    });
}
