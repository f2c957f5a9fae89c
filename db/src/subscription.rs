use std::{collections::HashMap, sync::Arc, sync::Mutex};

use async_trait::async_trait;
use common::{
    error::{AppError, Res},
    plans::Tier,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::subscription::{SubscriptionRecord, SubscriptionRow};

/// Persistence of subscription records, keyed by user id.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Res<Option<SubscriptionRecord>>;

    async fn find_by_customer(&self, customer_id: &str) -> Res<Option<SubscriptionRecord>>;

    /// Inserts the record or replaces the existing one for the same user.
    async fn upsert(&self, record: &SubscriptionRecord) -> Res<()>;

    /// Tier the rate limiter should apply to the user.
    async fn effective_tier(&self, user_id: Uuid) -> Res<Tier> {
        Ok(self
            .find_by_user(user_id)
            .await?
            .map(|record| record.effective_tier())
            .unwrap_or(Tier::Free))
    }
}

const SELECT_COLUMNS: &str = "SELECT user_id, tier, status, current_period_start, current_period_end, \
     cancel_at_period_end, price_id, customer_id, subscription_id FROM subscriptions";

pub struct PgSubscriptionStore {
    pool: Arc<PgPool>,
}

impl PgSubscriptionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_by_user(&self, user_id: Uuid) -> Res<Option<SubscriptionRecord>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "{} WHERE user_id = $1",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_by_customer(&self, customer_id: &str) -> Res<Option<SubscriptionRecord>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "{} WHERE customer_id = $1 ORDER BY updated_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Res<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, tier, status, current_period_start, current_period_end,
                                       cancel_at_period_end, price_id, customer_id, subscription_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                price_id = EXCLUDED.price_id,
                customer_id = EXCLUDED.customer_id,
                subscription_id = EXCLUDED.subscription_id,
                updated_at = NOW()
            "#,
        )
        .bind(record.user_id)
        .bind(record.tier.as_str())
        .bind(record.status.as_str())
        .bind(record.current_period_start)
        .bind(record.current_period_end)
        .bind(record.cancel_at_period_end)
        .bind(&record.price_id)
        .bind(&record.customer_id)
        .bind(&record.subscription_id)
        .execute(self.pool.as_ref())
        .await
        .map(|_| ())
        .map_err(AppError::from)
    }
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    records: Mutex<HashMap<Uuid, SubscriptionRecord>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SubscriptionRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.user_id, r)).collect();
        Self {
            records: Mutex::new(map),
        }
    }

    fn lock(&self) -> Res<std::sync::MutexGuard<'_, HashMap<Uuid, SubscriptionRecord>>> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal("Subscription store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn find_by_user(&self, user_id: Uuid) -> Res<Option<SubscriptionRecord>> {
        Ok(self.lock()?.get(&user_id).cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> Res<Option<SubscriptionRecord>> {
        Ok(self
            .lock()?
            .values()
            .find(|r| r.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Res<()> {
        self.lock()?.insert(record.user_id, record.clone());
        Ok(())
    }
}
