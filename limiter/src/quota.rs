use std::collections::HashMap;

use chrono::TimeDelta;
use common::plans::Tier;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub max_requests: u32,
    pub window: TimeDelta,
}

/// Quotas of one limiter scope, per tier.
#[derive(Debug, Clone)]
pub struct QuotaTable {
    quotas: HashMap<Tier, Quota>,
}

impl QuotaTable {
    /// Free tier gets `base` requests per window, premium tiers a multiple of it.
    pub fn scaled(base: u32, window_secs: u64) -> Self {
        let window = TimeDelta::seconds(window_secs.max(1) as i64);
        let quotas = Tier::ALL
            .into_iter()
            .map(|tier| {
                let quota = Quota {
                    max_requests: base.saturating_mul(tier.multiplier()),
                    window,
                };
                (tier, quota)
            })
            .collect();
        Self { quotas }
    }

    pub fn with_quota(mut self, tier: Tier, quota: Quota) -> Self {
        self.quotas.insert(tier, quota);
        self
    }

    pub fn get(&self, tier: Tier) -> Quota {
        match self.quotas.get(&tier) {
            Some(quota) => *quota,
            None => self.quotas[&Tier::Free],
        }
    }
}
