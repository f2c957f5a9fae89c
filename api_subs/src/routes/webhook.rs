use actix_web::{HttpRequest, Responder, post, web};
use common::{
    error::{AppError, Res},
    http::Success,
};

use crate::{BillingState, dtos::billing::WebhookResponse, services};

/// Receives Stripe events.
///
/// The raw body is verified against the `stripe-signature` header before
/// anything is processed. Unverifiable requests get 400; store failures get
/// 500 so Stripe delivers the event again.
#[post("/stripe")]
pub async fn post_stripe_webhook(
    state: web::Data<BillingState>,
    req: HttpRequest,
    payload: web::Bytes,
) -> Res<impl Responder> {
    let signature = req
        .headers()
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing stripe-signature header".to_string()))?;
    let payload = std::str::from_utf8(&payload)
        .map_err(|_| AppError::BadRequest("Webhook payload is not valid UTF-8".to_string()))?;

    let event = services::webhook::construct_event(payload, signature, &state.webhook_secret)?;
    state.reconciler.apply(event).await?;

    Success::ok(WebhookResponse { received: true })
}
