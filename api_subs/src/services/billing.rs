use common::{
    error::{AppError, Res},
    plans::Tier,
};
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData,
    CustomerId, Metadata, Subscription, UpdateSubscription, UpdateSubscriptionItems,
};
use uuid::Uuid;

use crate::{
    misc::event::{META_PLAN_ID, META_USER_ID},
    services::source::parse_subscription_id,
};

/// Creates a subscription-mode checkout session for one plan.
///
/// The user and plan are attached as metadata to both the session and the
/// subscription it creates, so webhook events can be traced back to the user.
pub async fn create_checkout_session(
    client: &Client,
    customer_id: CustomerId,
    user_id: Uuid,
    tier: Tier,
    price_id: &str,
    app_url: &str,
) -> Res<String> {
    let mut metadata = Metadata::new();
    metadata.insert(META_USER_ID.to_string(), user_id.to_string());
    metadata.insert(META_PLAN_ID.to_string(), tier.to_string());

    let user_ref = user_id.to_string();
    let success_url = format!("{}/account?checkout=success", app_url);
    let cancel_url = format!("{}/pricing?checkout=canceled", app_url);

    let mut params = CreateCheckoutSession::new();
    params.mode = Some(CheckoutSessionMode::Subscription);
    params.customer = Some(customer_id);
    params.client_reference_id = Some(&user_ref);
    params.success_url = Some(&success_url);
    params.cancel_url = Some(&cancel_url);
    params.line_items = Some(vec![CreateCheckoutSessionLineItems {
        price: Some(price_id.to_string()),
        quantity: Some(1),
        ..Default::default()
    }]);
    params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
        metadata: Some(metadata.clone()),
        ..Default::default()
    });
    params.metadata = Some(metadata);

    let session = CheckoutSession::create(client, params).await?;
    session
        .url
        .ok_or_else(|| AppError::Internal(format!("Checkout session {} has no URL", session.id)))
}

/// Moves the subscription's item to another price.
pub async fn change_price(client: &Client, subscription_id: &str, price_id: &str) -> Res<()> {
    let id = parse_subscription_id(subscription_id)?;
    let subscription = Subscription::retrieve(client, &id, &[]).await?;
    let item = subscription.items.data.first().ok_or_else(|| {
        AppError::Internal(format!("Subscription {} has no items", subscription_id))
    })?;

    let mut params = UpdateSubscription::new();
    params.items = Some(vec![UpdateSubscriptionItems {
        id: Some(item.id.to_string()),
        price: Some(price_id.to_string()),
        ..Default::default()
    }]);
    Subscription::update(client, &id, params).await?;
    Ok(())
}

/// Stops renewal; access continues until the current period ends.
pub async fn cancel_at_period_end(client: &Client, subscription_id: &str) -> Res<()> {
    let id = parse_subscription_id(subscription_id)?;
    let mut params = UpdateSubscription::new();
    params.cancel_at_period_end = Some(true);
    Subscription::update(client, &id, params).await?;
    Ok(())
}

pub async fn create_portal_session(
    client: &Client,
    customer_id: CustomerId,
    app_url: &str,
) -> Res<String> {
    let return_url = format!("{}/account", app_url);
    let mut params = CreateBillingPortalSession::new(customer_id);
    params.return_url = Some(&return_url);

    let session = BillingPortalSession::create(client, params).await?;
    Ok(session.url)
}
