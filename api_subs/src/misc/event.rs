use chrono::{DateTime, Utc};
use common::plans::SubscriptionStatus;
use stripe::{Event, EventObject, EventType, Expandable, Metadata, Subscription};
use uuid::Uuid;

use crate::models::event::{BillingEvent, SubscriptionSnapshot};

pub(crate) const META_USER_ID: &str = "userId";
pub(crate) const META_PLAN_ID: &str = "planId";

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn user_id_from(metadata: Option<&Metadata>, fallback: Option<&str>) -> Option<Uuid> {
    let raw = metadata
        .and_then(|m| m.get(META_USER_ID))
        .map(String::as_str)
        .or(fallback)?;
    match Uuid::parse_str(raw) {
        Ok(user_id) => Some(user_id),
        Err(_) => {
            log::warn!("Ignoring malformed user id '{}' in Stripe metadata", raw);
            None
        }
    }
}

fn status_from(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    let name = match status {
        stripe::SubscriptionStatus::Active => "active",
        stripe::SubscriptionStatus::Canceled => "canceled",
        stripe::SubscriptionStatus::Incomplete => "incomplete",
        stripe::SubscriptionStatus::IncompleteExpired => "incomplete_expired",
        stripe::SubscriptionStatus::PastDue => "past_due",
        stripe::SubscriptionStatus::Paused => "paused",
        stripe::SubscriptionStatus::Trialing => "trialing",
        stripe::SubscriptionStatus::Unpaid => "unpaid",
    };
    SubscriptionStatus::from_stripe(name)
}

/// Enables `SubscriptionSnapshot::from(&subscription)` for retrieved and
/// webhook-delivered subscriptions alike.
impl From<&Subscription> for SubscriptionSnapshot {
    fn from(sub: &Subscription) -> Self {
        let customer_id = match &sub.customer {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(customer) => customer.id.to_string(),
        };
        SubscriptionSnapshot {
            id: sub.id.to_string(),
            customer_id,
            status: status_from(sub.status),
            price_id: sub
                .items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .map(|price| price.id.to_string()),
            current_period_start: timestamp(sub.current_period_start),
            current_period_end: timestamp(sub.current_period_end),
            cancel_at_period_end: sub.cancel_at_period_end,
            user_id: user_id_from(Some(&sub.metadata), None),
        }
    }
}

impl From<Event> for BillingEvent {
    fn from(event: Event) -> Self {
        match (event.type_, event.data.object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
                BillingEvent::CheckoutCompleted {
                    user_id: user_id_from(
                        session.metadata.as_ref(),
                        session.client_reference_id.as_deref(),
                    ),
                    plan: session
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get(META_PLAN_ID))
                        .cloned(),
                    customer_id: session.customer.as_ref().map(|c| match c {
                        Expandable::Id(id) => id.to_string(),
                        Expandable::Object(customer) => customer.id.to_string(),
                    }),
                    subscription_id: session.subscription.as_ref().map(|s| match s {
                        Expandable::Id(id) => id.to_string(),
                        Expandable::Object(sub) => sub.id.to_string(),
                    }),
                }
            }
            (
                EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated,
                EventObject::Subscription(sub),
            ) => BillingEvent::SubscriptionChanged(SubscriptionSnapshot::from(&sub)),
            (EventType::CustomerSubscriptionDeleted, EventObject::Subscription(sub)) => {
                BillingEvent::SubscriptionDeleted(SubscriptionSnapshot::from(&sub))
            }
            (EventType::InvoicePaymentSucceeded, EventObject::Invoice(invoice)) => {
                BillingEvent::InvoicePaid {
                    customer_id: invoice.customer.as_ref().map(|c| match c {
                        Expandable::Id(id) => id.to_string(),
                        Expandable::Object(customer) => customer.id.to_string(),
                    }),
                    subscription_id: invoice.subscription.as_ref().map(|s| match s {
                        Expandable::Id(id) => id.to_string(),
                        Expandable::Object(sub) => sub.id.to_string(),
                    }),
                    billing_reason: invoice
                        .billing_reason
                        .map(|reason| reason.as_str().to_string()),
                }
            }
            (EventType::InvoicePaymentFailed, EventObject::Invoice(invoice)) => {
                BillingEvent::InvoiceFailed {
                    customer_id: invoice.customer.as_ref().map(|c| match c {
                        Expandable::Id(id) => id.to_string(),
                        Expandable::Object(customer) => customer.id.to_string(),
                    }),
                }
            }
            (event_type, _) => BillingEvent::Other(event_type.to_string()),
        }
    }
}
