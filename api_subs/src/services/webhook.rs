use common::error::{AppError, Res};
use stripe::Webhook;

use crate::models::event::BillingEvent;

/// Verifies the payload against the `stripe-signature` header and decodes it.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<BillingEvent> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => {
            log::info!("Received webhook event {} ({})", event.id, event.type_);
            Ok(BillingEvent::from(event))
        }
        Err(e) => {
            log::error!("Error constructing webhook event: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}
