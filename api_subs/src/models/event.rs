use chrono::{DateTime, Utc};
use common::plans::SubscriptionStatus;
use uuid::Uuid;

/// The parts of a Stripe subscription the reconciler reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    /// `userId` metadata copied onto subscriptions created through checkout.
    pub user_id: Option<Uuid>,
}

/// A verified webhook event, reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted {
        user_id: Option<Uuid>,
        plan: Option<String>,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    },
    /// `customer.subscription.created` and `customer.subscription.updated`.
    SubscriptionChanged(SubscriptionSnapshot),
    SubscriptionDeleted(SubscriptionSnapshot),
    InvoicePaid {
        customer_id: Option<String>,
        subscription_id: Option<String>,
        billing_reason: Option<String>,
    },
    InvoiceFailed {
        customer_id: Option<String>,
    },
    /// Any other event type, acknowledged without changes.
    Other(String),
}

impl BillingEvent {
    pub fn name(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { .. } => "checkout.session.completed",
            BillingEvent::SubscriptionChanged(_) => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted(_) => "customer.subscription.deleted",
            BillingEvent::InvoicePaid { .. } => "invoice.payment_succeeded",
            BillingEvent::InvoiceFailed { .. } => "invoice.payment_failed",
            BillingEvent::Other(name) => name,
        }
    }
}
