use stripe::{Client, CreateCustomer, Customer, CustomerId, ListCustomers, Metadata};
use uuid::Uuid;

use crate::error::{AppError, Res};

pub fn create_client(secret_key: &str) -> Client {
    Client::new(secret_key)
}

pub fn parse_customer_id(customer_id: &str) -> Res<CustomerId> {
    customer_id.parse::<CustomerId>().map_err(|e| {
        AppError::Internal(format!(
            "Failed to parse customer id: {}. {}",
            customer_id, e
        ))
    })
}

pub async fn create_customer(client: &Client, email: Option<&str>, user_id: Uuid) -> Res<Customer> {
    let mut metadata = Metadata::new();
    metadata.insert("userId".to_string(), user_id.to_string());

    let params = CreateCustomer {
        email,
        metadata: Some(metadata),
        ..Default::default()
    };

    Customer::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Returns the Stripe customer id to bill the user under.
///
/// A previously stored id wins, then an existing customer with the same email,
/// otherwise a new customer is created.
pub async fn resolve_customer(
    client: &Client,
    stored_customer_id: Option<&str>,
    email: Option<&str>,
    user_id: Uuid,
) -> Res<CustomerId> {
    if let Some(customer_id) = stored_customer_id {
        return parse_customer_id(customer_id);
    }

    if let Some(email) = email {
        let params = ListCustomers {
            email: Some(email),
            limit: Some(1),
            ..Default::default()
        };
        let existing = Customer::list(client, &params).await?;
        if let Some(customer) = existing.data.into_iter().next() {
            log::info!("Reusing Stripe customer {} for user {}", customer.id, user_id);
            return Ok(customer.id);
        }
    }

    let customer = create_customer(client, email, user_id).await?;
    log::info!("Created Stripe customer {} for user {}", customer.id, user_id);
    Ok(customer.id)
}
