use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    plans::{SubscriptionStatus, Tier},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing state of one user. At most one record exists per `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub price_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

impl SubscriptionRecord {
    /// View returned for users who never subscribed.
    pub fn free(user_id: Uuid) -> Self {
        SubscriptionRecord {
            user_id,
            tier: Tier::Free,
            status: SubscriptionStatus::Active,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            price_id: None,
            customer_id: None,
            subscription_id: None,
        }
    }

    /// Tier used for quotas: premium tiers only count while the subscription is active.
    pub fn effective_tier(&self) -> Tier {
        match self.status {
            SubscriptionStatus::Active => self.tier,
            SubscriptionStatus::PastDue | SubscriptionStatus::Canceled => Tier::Free,
        }
    }

    pub fn has_active_subscription(&self) -> bool {
        self.status == SubscriptionStatus::Active && self.subscription_id.is_some()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub user_id: Uuid,
    pub tier: String,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub price_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = AppError;

    fn try_from(row: SubscriptionRow) -> Res<Self> {
        let tier = row.tier.parse::<Tier>().map_err(|_| {
            AppError::Internal(format!("Stored tier '{}' is not recognised", row.tier))
        })?;
        Ok(SubscriptionRecord {
            user_id: row.user_id,
            tier,
            status: row.status.parse()?,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            price_id: row.price_id,
            customer_id: row.customer_id,
            subscription_id: row.subscription_id,
        })
    }
}
