use std::sync::Arc;

use actix_web::web::{self};
use common::{env_config::Config, http::json_config, plans::PlanCatalog};
use db::SubscriptionStore;

pub mod routes {
    pub mod billing;
    pub mod webhook;
}

pub mod services {
    pub(crate) mod billing;
    pub mod reconciler;
    pub mod source;
    pub(crate) mod webhook;
}

pub mod models {
    pub mod event;
}

mod dtos {
    pub(crate) mod billing;
}

mod misc {
    pub(crate) mod event;
}

pub use models::event::{BillingEvent, SubscriptionSnapshot};
pub use services::{
    reconciler::{Reconciler, Reconciliation},
    source::{StripeSubscriptionSource, SubscriptionSource},
};

/// Everything the billing and webhook routes share.
pub struct BillingState {
    pub client: stripe::Client,
    pub catalog: PlanCatalog,
    pub store: Arc<dyn SubscriptionStore>,
    pub reconciler: Reconciler,
    pub webhook_secret: String,
    pub app_url: String,
}

impl BillingState {
    pub fn from_config(config: &Config, store: Arc<dyn SubscriptionStore>) -> Self {
        let client = common::stripe::create_client(&config.stripe_secret_key);
        let catalog = PlanCatalog::new(&config.stripe_prices);
        let source = Arc::new(StripeSubscriptionSource::new(client.clone()));
        BillingState {
            reconciler: Reconciler::new(store.clone(), source, catalog.clone()),
            client,
            catalog,
            store,
            webhook_secret: config.stripe_webhook_secret.clone(),
            app_url: config.app_url.clone(),
        }
    }
}

pub fn mount_billing() -> actix_web::Scope {
    web::scope("/billing")
        .app_data(json_config())
        .service(routes::billing::post_create_subscription)
        .service(routes::billing::post_update_subscription)
        .service(routes::billing::post_cancel_subscription)
        .service(routes::billing::post_customer_portal)
        .service(routes::billing::get_subscription)
}

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/webhooks").service(routes::webhook::post_stripe_webhook)
}
