use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{error::Res, plans::Tier};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{QuotaTable, RateDecision, RateLimiter};

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    request_count: u32,
    window_reset_at: DateTime<Utc>,
}

/// Process-local fixed-window limiter.
///
/// Counters reset entirely when the window elapses, so a user may spend two
/// full quotas back to back around a window boundary.
pub struct FixedWindowLimiter {
    scope: String,
    quotas: QuotaTable,
    entries: DashMap<(Uuid, Tier), WindowEntry>,
}

impl FixedWindowLimiter {
    pub fn new(scope: &str, quotas: QuotaTable) -> Self {
        FixedWindowLimiter {
            scope: scope.to_string(),
            quotas,
            entries: DashMap::new(),
        }
    }

    pub fn check_at(&self, user_id: Uuid, tier: Tier, now: DateTime<Utc>) -> RateDecision {
        let quota = self.quotas.get(tier);
        let mut entry = self
            .entries
            .entry((user_id, tier))
            .or_insert_with(|| WindowEntry {
                request_count: 0,
                window_reset_at: now + quota.window,
            });

        if now >= entry.window_reset_at {
            entry.request_count = 0;
            entry.window_reset_at = now + quota.window;
        }

        if entry.request_count >= quota.max_requests {
            return RateDecision {
                allowed: false,
                limit: quota.max_requests,
                remaining: 0,
                reset_at: entry.window_reset_at,
            };
        }

        entry.request_count += 1;
        RateDecision {
            allowed: true,
            limit: quota.max_requests,
            remaining: quota.max_requests - entry.request_count,
            reset_at: entry.window_reset_at,
        }
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn check_and_consume(&self, user_id: Uuid, tier: Tier) -> Res<RateDecision> {
        Ok(self.check_at(user_id, tier, Utc::now()))
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn scope(&self) -> &str {
        &self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn limiter() -> FixedWindowLimiter {
        FixedWindowLimiter::new("ai", QuotaTable::scaled(10, 60))
    }

    #[test]
    fn allows_exactly_max_requests_per_window() {
        let limiter = limiter();
        let user = Uuid::new_v4();
        let now = Utc::now();

        for i in 0..10 {
            let decision = limiter.check_at(user, Tier::Free, now + TimeDelta::seconds(i));
            assert!(decision.allowed, "request {} should pass", i + 1);
            assert_eq!(decision.remaining, 9 - i as u32);
        }

        let denied = limiter.check_at(user, Tier::Free, now + TimeDelta::seconds(30));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_at > now + TimeDelta::seconds(30));
        assert_eq!(denied.reset_at, now + TimeDelta::seconds(60));
    }

    #[test]
    fn denied_requests_do_not_extend_the_count() {
        let limiter = limiter();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for _ in 0..25 {
            limiter.check_at(user, Tier::Free, now);
        }
        let entry = *limiter.entries.get(&(user, Tier::Free)).unwrap();
        assert_eq!(entry.request_count, 10);
    }

    #[test]
    fn window_resets_once_reset_time_is_reached() {
        let limiter = limiter();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for _ in 0..11 {
            limiter.check_at(user, Tier::Free, now);
        }

        let later = now + TimeDelta::seconds(60);
        let decision = limiter.check_at(user, Tier::Free, later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_at, later + TimeDelta::seconds(60));
    }

    #[test]
    fn boundary_burst_is_permitted() {
        let limiter = limiter();
        let user = Uuid::new_v4();
        let now = Utc::now();
        // the window opens with the first request
        assert!(limiter.check_at(user, Tier::Free, now).allowed);
        let allowed_before = 1 + (0..9)
            .filter(|_| limiter.check_at(user, Tier::Free, now + TimeDelta::seconds(59)).allowed)
            .count();
        let allowed_after = (0..10)
            .filter(|_| limiter.check_at(user, Tier::Free, now + TimeDelta::seconds(60)).allowed)
            .count();
        assert_eq!(allowed_before + allowed_after, 20);
    }

    #[test]
    fn tiers_and_users_are_counted_separately() {
        let limiter = limiter();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for _ in 0..10 {
            limiter.check_at(a, Tier::Free, now);
        }
        assert!(!limiter.check_at(a, Tier::Free, now).allowed);
        assert!(limiter.check_at(b, Tier::Free, now).allowed);

        let premium = limiter.check_at(a, Tier::PremiumAnnual, now);
        assert!(premium.allowed);
        assert_eq!(premium.limit, 30);
    }

    #[test]
    fn sweep_removes_only_expired_windows() {
        let limiter = limiter();
        let now = Utc::now();
        limiter.check_at(Uuid::new_v4(), Tier::Free, now);
        limiter.check_at(Uuid::new_v4(), Tier::Free, now + TimeDelta::seconds(30));
        assert_eq!(limiter.len(), 2);

        assert_eq!(limiter.sweep_at(now + TimeDelta::seconds(45)), 0);
        assert_eq!(limiter.sweep_at(now + TimeDelta::seconds(60)), 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.sweep_at(now + TimeDelta::minutes(10)), 1);
        assert!(limiter.is_empty());
    }
}
