use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    env_config::PriceConfig,
    error::{AppError, Res},
};

/// Subscription level. Decides rate limit quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Free,
    PremiumMonthly,
    PremiumAnnual,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::PremiumMonthly, Tier::PremiumAnnual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::PremiumMonthly => "premium-monthly",
            Tier::PremiumAnnual => "premium-annual",
        }
    }

    /// Quota multiplier relative to the free tier.
    pub fn multiplier(&self) -> u32 {
        match self {
            Tier::Free => 1,
            Tier::PremiumMonthly => 2,
            Tier::PremiumAnnual => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = AppError;

    fn from_str(s: &str) -> Res<Self> {
        match s {
            "free" => Ok(Tier::Free),
            "premium-monthly" => Ok(Tier::PremiumMonthly),
            "premium-annual" => Ok(Tier::PremiumAnnual),
            other => Err(AppError::BadRequest(format!("Unknown plan '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Folds a Stripe subscription status into the three states we persist.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" | "trialing" => SubscriptionStatus::Active,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::PastDue,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Res<Self> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(AppError::Internal(format!(
                "Unknown subscription status '{}'",
                other
            ))),
        }
    }
}

/// Maps purchasable tiers to Stripe price ids and back.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    premium_monthly: Option<String>,
    premium_annual: Option<String>,
}

impl PlanCatalog {
    pub fn new(prices: &PriceConfig) -> Self {
        let non_empty = |price: &str| Some(price.to_string()).filter(|p| !p.is_empty());
        PlanCatalog {
            premium_monthly: non_empty(&prices.premium_monthly),
            premium_annual: non_empty(&prices.premium_annual),
        }
    }

    pub fn price_for(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Free => None,
            Tier::PremiumMonthly => self.premium_monthly.as_deref(),
            Tier::PremiumAnnual => self.premium_annual.as_deref(),
        }
    }

    pub fn tier_for_price(&self, price_id: &str) -> Option<Tier> {
        [Tier::PremiumMonthly, Tier::PremiumAnnual]
            .into_iter()
            .find(|tier| self.price_for(*tier) == Some(price_id))
    }

    /// Parses a client supplied plan id into a purchasable tier with its price.
    pub fn purchasable(&self, plan_id: &str) -> Res<(Tier, String)> {
        let tier: Tier = plan_id.parse()?;
        self.price_for(tier)
            .map(|price| (tier, price.to_string()))
            .ok_or_else(|| AppError::BadRequest(format!("Plan '{}' is not purchasable", plan_id)))
    }
}
