use actix_web::{Responder, get, post, web};
use common::{
    error::{AppError, Res},
    http::Success,
    identity::AuthUser,
    stripe::{parse_customer_id, resolve_customer},
};
use db::models::subscription::SubscriptionRecord;

use crate::{
    BillingState,
    dtos::billing::{ChangeResponse, PlanRequest, UrlResponse},
    services,
};

fn plan_id(req: PlanRequest) -> Res<String> {
    req.plan_id
        .filter(|plan| !plan.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required field: planId".to_string()))
}

/// Returns the user's record when it holds a live Stripe subscription.
async fn active_subscription(state: &BillingState, user: &AuthUser) -> Res<SubscriptionRecord> {
    state
        .store
        .find_by_user(user.user_id)
        .await?
        .filter(SubscriptionRecord::has_active_subscription)
        .ok_or_else(|| AppError::NotFound("No active subscription found".to_string()))
}

/// Starts a Stripe Checkout for a premium plan.
///
/// # Returns
///
/// `{url}` of the hosted checkout page.
#[post("/create-subscription")]
pub async fn post_create_subscription(
    state: web::Data<BillingState>,
    user: web::ReqData<AuthUser>,
    req: web::Json<PlanRequest>,
) -> Res<impl Responder> {
    let (tier, price_id) = state.catalog.purchasable(&plan_id(req.into_inner())?)?;
    let record = state.store.find_by_user(user.user_id).await?;

    let customer_id = resolve_customer(
        &state.client,
        record.as_ref().and_then(|r| r.customer_id.as_deref()),
        user.email.as_deref(),
        user.user_id,
    )
    .await?;

    let url = services::billing::create_checkout_session(
        &state.client,
        customer_id,
        user.user_id,
        tier,
        &price_id,
        &state.app_url,
    )
    .await?;
    log::info!("Checkout for {} started by user {}", tier, user.user_id);
    Success::ok(UrlResponse { url })
}

/// Switches an active subscription to another premium plan.
#[post("/update-subscription")]
pub async fn post_update_subscription(
    state: web::Data<BillingState>,
    user: web::ReqData<AuthUser>,
    req: web::Json<PlanRequest>,
) -> Res<impl Responder> {
    let (tier, price_id) = state.catalog.purchasable(&plan_id(req.into_inner())?)?;
    let record = active_subscription(&state, &user).await?;
    let subscription_id = record.subscription_id.clone().unwrap_or_default();

    services::billing::change_price(&state.client, &subscription_id, &price_id).await?;
    state
        .store
        .upsert(&SubscriptionRecord {
            tier,
            price_id: Some(price_id),
            ..record
        })
        .await?;

    Success::ok(ChangeResponse::done(format!(
        "Subscription updated to {}",
        tier
    )))
}

/// Cancels the subscription at the end of the current period.
#[post("/cancel-subscription")]
pub async fn post_cancel_subscription(
    state: web::Data<BillingState>,
    user: web::ReqData<AuthUser>,
) -> Res<impl Responder> {
    let record = active_subscription(&state, &user).await?;
    let subscription_id = record.subscription_id.clone().unwrap_or_default();

    services::billing::cancel_at_period_end(&state.client, &subscription_id).await?;
    state
        .store
        .upsert(&SubscriptionRecord {
            cancel_at_period_end: true,
            ..record
        })
        .await?;

    Success::ok(ChangeResponse::done(
        "Subscription will be canceled at the end of the billing period",
    ))
}

/// Opens the Stripe customer portal for payment methods and invoices.
#[post("/customer-portal")]
pub async fn post_customer_portal(
    state: web::Data<BillingState>,
    user: web::ReqData<AuthUser>,
) -> Res<impl Responder> {
    let customer_id = state
        .store
        .find_by_user(user.user_id)
        .await?
        .and_then(|record| record.customer_id)
        .ok_or_else(|| AppError::NotFound("No billing account found".to_string()))?;

    let url = services::billing::create_portal_session(
        &state.client,
        parse_customer_id(&customer_id)?,
        &state.app_url,
    )
    .await?;
    Success::ok(UrlResponse { url })
}

/// The caller's subscription, or the free plan when they never subscribed.
#[get("/subscription")]
pub async fn get_subscription(
    state: web::Data<BillingState>,
    user: web::ReqData<AuthUser>,
) -> Res<impl Responder> {
    let record = state
        .store
        .find_by_user(user.user_id)
        .await?
        .unwrap_or_else(|| SubscriptionRecord::free(user.user_id));
    Success::ok(record)
}
