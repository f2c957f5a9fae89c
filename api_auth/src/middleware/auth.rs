//! Auth gate for the proxy and billing scopes.
//!
//! Extracts the bearer token, exchanges it for an [`AuthUser`] through the
//! configured [`IdentityProvider`] and stores the user in the request
//! extensions. Requests without a valid token are answered with 401 and never
//! reach the wrapped service.

use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::identity::{self, AuthUser};
use futures::future::{Ready, ok};

use crate::provider::IdentityProvider;

pub struct AuthMiddleware {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthMiddleware {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        AuthMiddleware { provider }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            provider: self.provider.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    provider: Arc<dyn IdentityProvider>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
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
        let provider = self.provider.clone();

        Box::pin(async move {
            // no token or not a bearer token - 401 without calling the provider
            let token = match identity::bearer_token(&req) {
                Ok(token) => token,
                Err(e) => return Ok(req.error_response(e)),
            };

            // validate token and insert user to request object for future usage
            let user: AuthUser = match provider.verify(&token).await {
                Ok(user) => user,
                Err(e) => return Ok(req.error_response(e)),
            };
            req.extensions_mut().insert(user);

            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};
    use async_trait::async_trait;
    use common::error::{AppError, Res};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct StaticProvider {
        user_id: Uuid,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn verify(&self, token: &str) -> Res<AuthUser> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "good" {
                Ok(AuthUser {
                    user_id: self.user_id,
                    email: None,
                })
            } else {
                Err(AppError::Unauthorized("Invalid token".to_string()))
            }
        }
    }

    async fn whoami(user: web::ReqData<AuthUser>) -> HttpResponse {
        HttpResponse::Ok().body(user.user_id.to_string())
    }

    #[actix_web::test]
    async fn gate_resolves_user_and_rejects_bad_tokens() {
        let provider = Arc::new(StaticProvider {
            user_id: Uuid::new_v4(),
            calls: AtomicUsize::new(0),
        });
        let app = test::init_service(
            App::new().service(
                web::scope("/secured")
                    .wrap(AuthMiddleware::new(provider.clone()))
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/secured/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let req = test::TestRequest::get()
            .uri("/secured/me")
            .insert_header(("Authorization", "Token good"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let req = test::TestRequest::get()
            .uri("/secured/me")
            .insert_header(("Authorization", "Bearer bad"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/secured/me")
            .insert_header(("Authorization", "Bearer good"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(body, provider.user_id.to_string().as_bytes());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
