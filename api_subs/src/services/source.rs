use async_trait::async_trait;
use common::error::{AppError, Res};
use stripe::{Client, Subscription, SubscriptionId};

use crate::models::event::SubscriptionSnapshot;

/// Fetches the current state of a subscription from the billing provider.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn retrieve(&self, subscription_id: &str) -> Res<SubscriptionSnapshot>;
}

pub struct StripeSubscriptionSource {
    client: Client,
}

impl StripeSubscriptionSource {
    pub fn new(client: Client) -> Self {
        StripeSubscriptionSource { client }
    }
}

pub(crate) fn parse_subscription_id(subscription_id: &str) -> Res<SubscriptionId> {
    subscription_id.parse::<SubscriptionId>().map_err(|e| {
        AppError::Internal(format!(
            "Failed to parse subscription id: {}. {}",
            subscription_id, e
        ))
    })
}

#[async_trait]
impl SubscriptionSource for StripeSubscriptionSource {
    async fn retrieve(&self, subscription_id: &str) -> Res<SubscriptionSnapshot> {
        let id = parse_subscription_id(subscription_id)?;
        let subscription = Subscription::retrieve(&self.client, &id, &[]).await?;
        Ok(SubscriptionSnapshot::from(&subscription))
    }
}
