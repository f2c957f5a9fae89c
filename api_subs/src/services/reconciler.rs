//! Applies verified billing events to the subscription store.
//!
//! Every transition recomputes the record from the event (and a fresh read of
//! the subscription where needed) and upserts it by user id, so delivering an
//! event twice leaves the same state as delivering it once. Events that cannot
//! be matched to a user are logged and acknowledged; store and provider
//! failures are returned so the delivery is retried.

use std::sync::Arc;

use common::{
    error::Res,
    plans::{PlanCatalog, SubscriptionStatus, Tier},
};
use db::{SubscriptionStore, models::subscription::SubscriptionRecord};
use uuid::Uuid;

use crate::{
    models::event::{BillingEvent, SubscriptionSnapshot},
    services::source::SubscriptionSource,
};

/// Invoice billing reasons that start or renew a period.
const PERIOD_BILLING_REASONS: [&str; 2] = ["subscription_create", "subscription_cycle"];

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Applied(Uuid),
    Skipped(String),
}

pub struct Reconciler {
    store: Arc<dyn SubscriptionStore>,
    source: Arc<dyn SubscriptionSource>,
    catalog: PlanCatalog,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        source: Arc<dyn SubscriptionSource>,
        catalog: PlanCatalog,
    ) -> Self {
        Reconciler {
            store,
            source,
            catalog,
        }
    }

    pub async fn apply(&self, event: BillingEvent) -> Res<Reconciliation> {
        let name = event.name().to_string();
        let outcome = match event {
            BillingEvent::CheckoutCompleted {
                user_id,
                plan,
                customer_id,
                subscription_id,
            } => {
                self.checkout_completed(user_id, plan, customer_id, subscription_id)
                    .await?
            }
            BillingEvent::SubscriptionChanged(snapshot) => {
                self.subscription_changed(snapshot).await?
            }
            BillingEvent::SubscriptionDeleted(snapshot) => {
                self.subscription_deleted(snapshot).await?
            }
            BillingEvent::InvoicePaid {
                customer_id,
                subscription_id,
                billing_reason,
            } => {
                self.invoice_paid(customer_id, subscription_id, billing_reason)
                    .await?
            }
            BillingEvent::InvoiceFailed { customer_id } => self.invoice_failed(customer_id).await?,
            BillingEvent::Other(_) => Reconciliation::Skipped("unhandled event type".to_string()),
        };

        match &outcome {
            Reconciliation::Applied(user_id) => {
                log::info!("Applied {} to subscription of user {}", name, user_id)
            }
            Reconciliation::Skipped(reason) => log::info!("Skipped {}: {}", name, reason),
        }
        Ok(outcome)
    }

    async fn checkout_completed(
        &self,
        user_id: Option<Uuid>,
        plan: Option<String>,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    ) -> Res<Reconciliation> {
        let Some(user_id) = user_id else {
            return Ok(skipped("checkout session carries no user id"));
        };
        let Some(subscription_id) = subscription_id else {
            return Ok(skipped("checkout session has no subscription"));
        };

        let snapshot = self.source.retrieve(&subscription_id).await?;
        let tier = plan
            .as_deref()
            .and_then(|plan| plan.parse::<Tier>().ok())
            .filter(|tier| *tier != Tier::Free)
            .or_else(|| self.tier_for(&snapshot))
            .unwrap_or_else(|| {
                log::warn!(
                    "Checkout for user {} names no known plan, recording the free tier",
                    user_id
                );
                Tier::Free
            });

        let record = SubscriptionRecord {
            user_id,
            tier,
            status: snapshot.status,
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            price_id: snapshot.price_id,
            customer_id: customer_id.or(Some(snapshot.customer_id)),
            subscription_id: Some(snapshot.id),
        };
        self.store.upsert(&record).await?;
        Ok(Reconciliation::Applied(user_id))
    }

    async fn subscription_changed(&self, snapshot: SubscriptionSnapshot) -> Res<Reconciliation> {
        let record = match self.store.find_by_customer(&snapshot.customer_id).await? {
            Some(record) => record,
            // subscription events can arrive before the checkout completes
            None => match snapshot.user_id {
                Some(user_id) => self
                    .store
                    .find_by_user(user_id)
                    .await?
                    .unwrap_or_else(|| SubscriptionRecord::free(user_id)),
                None => return Ok(no_user_for(&snapshot.customer_id)),
            },
        };

        let tier = self.tier_for(&snapshot).unwrap_or(record.tier);
        let updated = SubscriptionRecord {
            tier,
            status: snapshot.status,
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            price_id: snapshot.price_id.or(record.price_id),
            customer_id: Some(snapshot.customer_id),
            subscription_id: Some(snapshot.id),
            ..record
        };
        self.store.upsert(&updated).await?;
        Ok(Reconciliation::Applied(updated.user_id))
    }

    async fn subscription_deleted(&self, snapshot: SubscriptionSnapshot) -> Res<Reconciliation> {
        let Some(record) = self
            .locate(Some(&snapshot.customer_id), snapshot.user_id)
            .await?
        else {
            return Ok(no_user_for(&snapshot.customer_id));
        };

        if record
            .subscription_id
            .as_deref()
            .is_some_and(|current| current != snapshot.id)
        {
            return Ok(skipped("deleted subscription is no longer the user's current one"));
        }

        let updated = SubscriptionRecord {
            status: SubscriptionStatus::Canceled,
            ..record
        };
        self.store.upsert(&updated).await?;
        Ok(Reconciliation::Applied(updated.user_id))
    }

    async fn invoice_paid(
        &self,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        billing_reason: Option<String>,
    ) -> Res<Reconciliation> {
        let reason = billing_reason.unwrap_or_default();
        if !PERIOD_BILLING_REASONS.contains(&reason.as_str()) {
            return Ok(skipped("invoice does not start or renew a period"));
        }
        let Some(subscription_id) = subscription_id else {
            return Ok(skipped("invoice has no subscription"));
        };

        let snapshot = self.source.retrieve(&subscription_id).await?;
        let customer_id = customer_id.unwrap_or_else(|| snapshot.customer_id.clone());
        let Some(record) = self.locate(Some(&customer_id), snapshot.user_id).await? else {
            return Ok(no_user_for(&customer_id));
        };

        let updated = SubscriptionRecord {
            status: snapshot.status,
            current_period_end: snapshot.current_period_end,
            ..record
        };
        self.store.upsert(&updated).await?;
        Ok(Reconciliation::Applied(updated.user_id))
    }

    async fn invoice_failed(&self, customer_id: Option<String>) -> Res<Reconciliation> {
        let Some(customer_id) = customer_id else {
            return Ok(skipped("invoice has no customer"));
        };
        let Some(record) = self.locate(Some(&customer_id), None).await? else {
            return Ok(no_user_for(&customer_id));
        };

        let updated = SubscriptionRecord {
            status: SubscriptionStatus::PastDue,
            ..record
        };
        self.store.upsert(&updated).await?;
        Ok(Reconciliation::Applied(updated.user_id))
    }

    fn tier_for(&self, snapshot: &SubscriptionSnapshot) -> Option<Tier> {
        snapshot
            .price_id
            .as_deref()
            .and_then(|price| self.catalog.tier_for_price(price))
    }

    async fn locate(
        &self,
        customer_id: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Res<Option<SubscriptionRecord>> {
        if let Some(customer_id) = customer_id {
            if let Some(record) = self.store.find_by_customer(customer_id).await? {
                return Ok(Some(record));
            }
        }
        match user_id {
            Some(user_id) => self.store.find_by_user(user_id).await,
            None => Ok(None),
        }
    }
}

fn skipped(reason: &str) -> Reconciliation {
    Reconciliation::Skipped(reason.to_string())
}

fn no_user_for(customer_id: &str) -> Reconciliation {
    log::warn!("No subscription record for Stripe customer {}", customer_id);
    Reconciliation::Skipped(format!("no user for customer {}", customer_id))
}
