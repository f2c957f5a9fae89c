use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};
use chrono::Utc;
use common::{error::AppError, identity};
use db::SubscriptionStore;
use futures::future::{Ready, ok};
use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use crate::RateLimiter;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Applies the per-user quota of one scope. Must run behind the auth gate.
pub struct UserRateLimiter {
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn SubscriptionStore>,
}

impl UserRateLimiter {
    pub fn new(limiter: Arc<dyn RateLimiter>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self { limiter, store }
    }
}

impl<S, B> Transform<S, ServiceRequest> for UserRateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = UserRateLimiterService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(UserRateLimiterService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            store: self.store.clone(),
        })
    }
}

pub struct UserRateLimiterService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn SubscriptionStore>,
}

impl<S, B> Service<ServiceRequest> for UserRateLimiterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let store = self.store.clone();

        Box::pin(async move {
            let user = match identity::get_auth_user_or_error(&req) {
                Ok(user) => user,
                Err(e) => return Ok(req.error_response(e)),
            };

            let tier = match store.effective_tier(user.user_id).await {
                Ok(tier) => tier,
                Err(e) => return Ok(req.error_response(e)),
            };

            let decision = match limiter.check_and_consume(user.user_id, tier).await {
                Ok(decision) => decision,
                Err(e) => return Ok(req.error_response(e)),
            };

            if !decision.allowed {
                let retry_after = decision.retry_after_secs(Utc::now());
                log::info!(
                    "User {} exceeded the '{}' quota ({} per window, tier {})",
                    user.user_id,
                    limiter.scope(),
                    decision.limit,
                    tier
                );
                return Ok(req.error_response(AppError::RateLimited {
                    message: format!(
                        "Rate limit exceeded. Try again in {} seconds.",
                        retry_after
                    ),
                    retry_after,
                }));
            }

            let mut res = srv.call(req).await?.map_into_boxed_body();
            let headers = res.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
            headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
            headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at.timestamp()));
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedWindowLimiter, QuotaTable};
    use actix_web::{App, HttpMessage, HttpResponse, http::StatusCode, test, web};
    use common::{
        identity::AuthUser,
        plans::{SubscriptionStatus, Tier},
    };
    use db::{MemorySubscriptionStore, models::subscription::SubscriptionRecord};
    use uuid::Uuid;

    #[actix_web::test]
    async fn premium_users_get_the_larger_quota() {
        let free_user = Uuid::new_v4();
        let premium_user = Uuid::new_v4();
        let store = Arc::new(MemorySubscriptionStore::with_records(vec![SubscriptionRecord {
            tier: Tier::PremiumMonthly,
            status: SubscriptionStatus::Active,
            subscription_id: Some("sub_1".to_string()),
            ..SubscriptionRecord::free(premium_user)
        }]));
        let limiter = Arc::new(FixedWindowLimiter::new("ai", QuotaTable::scaled(1, 60)));

        let app = test::init_service(
            App::new().service(
                web::scope("")
                    .wrap(UserRateLimiter::new(limiter, store))
                    .route("/", web::get().to(HttpResponse::Ok)),
            ),
        )
        .await;

        let call = |user_id: Uuid| {
            let req = test::TestRequest::get().uri("/").to_request();
            req.extensions_mut().insert(AuthUser {
                user_id,
                email: None,
            });
            req
        };

        let first = test::call_service(&app, call(free_user)).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get("x-ratelimit-remaining").unwrap(), "0");
        let second = test::call_service(&app, call(free_user)).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get("retry-after").is_some());

        for _ in 0..2 {
            let resp = test::call_service(&app, call(premium_user)).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let third = test::call_service(&app, call(premium_user)).await;
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn requests_without_identity_are_rejected() {
        let limiter = Arc::new(FixedWindowLimiter::new("ai", QuotaTable::scaled(5, 60)));
        let app = test::init_service(
            App::new()
                .wrap(UserRateLimiter::new(
                    limiter.clone(),
                    Arc::new(MemorySubscriptionStore::new()),
                ))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(limiter.is_empty());
    }
}
