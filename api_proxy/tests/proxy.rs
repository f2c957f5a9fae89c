use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use actix_web::{
    App,
    http::{StatusCode, header},
    test, web,
};
use api_proxy::{
    ProxyState,
    upstream::{Upstream, UpstreamCall},
};
use async_trait::async_trait;
use cache::MemoryCacheStore;
use common::{
    error::{AppError, Res},
    identity::AuthUser,
};
use db::MemorySubscriptionStore;
use limiter::{FixedWindowLimiter, QuotaTable};
use serde_json::{Value, json};
use uuid::Uuid;

/// Accepts any token that is a UUID and uses it as the user id.
struct UuidTokens;

#[async_trait]
impl api_auth::IdentityProvider for UuidTokens {
    async fn verify(&self, token: &str) -> Res<AuthUser> {
        Uuid::parse_str(token)
            .map(|user_id| AuthUser {
                user_id,
                email: None,
            })
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
    }
}

struct StubUpstream {
    name: &'static str,
    reply: Result<Value, (u16, Value)>,
    calls: AtomicUsize,
    last_call: Mutex<Option<UpstreamCall>>,
}

impl StubUpstream {
    fn ok(name: &'static str, body: Value) -> Arc<Self> {
        Arc::new(StubUpstream {
            name,
            reply: Ok(body),
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        })
    }

    fn failing(name: &'static str, status: u16, details: Value) -> Arc<Self> {
        Arc::new(StubUpstream {
            name,
            reply: Err((status, details)),
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for StubUpstream {
    fn provider(&self) -> &str {
        self.name
    }

    async fn call(&self, call: UpstreamCall) -> Res<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock().unwrap() = Some(call);
        match &self.reply {
            Ok(body) => Ok(body.clone()),
            Err((status, details)) => Err(AppError::Upstream {
                provider: self.name.to_string(),
                status: *status,
                details: details.clone(),
            }),
        }
    }
}

struct Upstreams {
    openai: Arc<StubUpstream>,
    tmdb: Arc<StubUpstream>,
    books: Arc<StubUpstream>,
}

impl Default for Upstreams {
    fn default() -> Self {
        Upstreams {
            openai: StubUpstream::ok("OpenAI", json!({ "choices": [] })),
            tmdb: StubUpstream::ok("TMDB", json!({ "results": [{ "id": 603 }] })),
            books: StubUpstream::ok("Google Books", json!({ "totalItems": 0 })),
        }
    }
}

macro_rules! proxy_app {
    ($upstreams:expr) => {{
        let store = Arc::new(MemorySubscriptionStore::new());
        let ai = Arc::new(FixedWindowLimiter::new("ai", QuotaTable::scaled(10, 60)));
        let metadata = Arc::new(FixedWindowLimiter::new("metadata", QuotaTable::scaled(20, 60)));
        let state = ProxyState {
            openai: $upstreams.openai.clone(),
            tmdb: $upstreams.tmdb.clone(),
            books: $upstreams.books.clone(),
            cache: Arc::new(MemoryCacheStore::new(100)),
            cache_ttl: Duration::from_secs(60),
        };
        test::init_service(
            App::new().app_data(web::Data::new(state)).service(
                web::scope("/api")
                    .service(
                        api_proxy::mount_ai()
                            .wrap(limiter::user_middleware(ai, store.clone()))
                            .wrap(api_auth::auth_middleware(Arc::new(UuidTokens))),
                    )
                    .service(
                        api_proxy::mount_metadata()
                            .wrap(limiter::user_middleware(metadata, store))
                            .wrap(api_auth::auth_middleware(Arc::new(UuidTokens))),
                    ),
            ),
        )
        .await
    }};
}

fn bearer(user: Uuid) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", user))
}

#[actix_web::test]
async fn free_user_gets_twenty_metadata_lookups_per_window() {
    let upstreams = Upstreams::default();
    let app = proxy_app!(upstreams);
    let user = Uuid::new_v4();

    for page in 0..20 {
        let req = test::TestRequest::post()
            .uri("/api/metadata/tmdb")
            .insert_header(bearer(user))
            .set_json(json!({ "endpoint": "search/movie", "params": { "query": "matrix", "page": page } }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "request {} should pass", page + 1);
    }

    let req = test::TestRequest::post()
        .uri("/api/metadata/tmdb")
        .insert_header(bearer(user))
        .set_json(json!({ "endpoint": "search/movie", "params": { "query": "matrix" } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));

    let body: Value = test::read_body_json(resp).await;
    let retry_after = body["retryAfter"].as_u64().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(upstreams.tmdb.calls(), 20);
}

#[actix_web::test]
async fn missing_token_never_reaches_the_upstream() {
    let upstreams = Upstreams::default();
    let app = proxy_app!(upstreams);

    let req = test::TestRequest::post()
        .uri("/api/ai/completions")
        .set_json(json!({ "model": "gpt-4o-mini", "messages": [{ "role": "user", "content": "hi" }] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No authorization token provided");

    let req = test::TestRequest::post()
        .uri("/api/metadata/books")
        .insert_header((header::AUTHORIZATION, "Bearer not-a-user"))
        .set_json(json!({ "endpoint": "volumes", "params": { "q": "dune" } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(upstreams.openai.calls(), 0);
    assert_eq!(upstreams.books.calls(), 0);
}

#[actix_web::test]
async fn completion_forwards_only_whitelisted_fields() {
    let upstreams = Upstreams::default();
    let app = proxy_app!(upstreams);

    let req = test::TestRequest::post()
        .uri("/api/ai/completions")
        .insert_header(bearer(Uuid::new_v4()))
        .set_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{ "role": "user", "content": "Suggest a novel" }],
            "max_tokens": 200,
            "api_key": "client-supplied"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-ratelimit-limit").unwrap(), "10");
    assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), "9");

    let call = upstreams.openai.last_call.lock().unwrap().clone().unwrap();
    assert_eq!(call.path, "chat/completions");
    let body = call.body.unwrap();
    assert_eq!(body["max_tokens"], 200);
    assert!(body.get("api_key").is_none());
}

#[actix_web::test]
async fn invalid_bodies_are_rejected_before_the_upstream() {
    let upstreams = Upstreams::default();
    let app = proxy_app!(upstreams);
    let user = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/ai/completions")
        .insert_header(bearer(user))
        .set_json(json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/metadata/tmdb")
        .insert_header(bearer(user))
        .set_json(json!({ "params": { "query": "alien" } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/metadata/tmdb")
        .insert_header(bearer(user))
        .insert_header(header::ContentType::json())
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());

    assert_eq!(upstreams.openai.calls(), 0);
    assert_eq!(upstreams.tmdb.calls(), 0);
}

#[actix_web::test]
async fn upstream_errors_keep_their_status() {
    let upstreams = Upstreams {
        tmdb: StubUpstream::failing("TMDB", 404, json!({ "status_message": "not found" })),
        ..Upstreams::default()
    };
    let app = proxy_app!(upstreams);
    let user = Uuid::new_v4();

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/metadata/tmdb")
            .insert_header(bearer(user))
            .set_json(json!({ "endpoint": "movie/0" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "TMDB API Error");
        assert_eq!(body["status"], 404);
        assert_eq!(body["details"]["status_message"], "not found");
    }
    // failures are not cached
    assert_eq!(upstreams.tmdb.calls(), 2);
}

#[actix_web::test]
async fn repeated_lookups_are_served_from_cache() {
    let upstreams = Upstreams::default();
    let app = proxy_app!(upstreams);
    let user = Uuid::new_v4();

    for params in [
        json!({ "q": "dune", "maxResults": 5 }),
        json!({ "maxResults": 5, "q": "dune" }),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/metadata/books")
            .insert_header(bearer(user))
            .set_json(json!({ "endpoint": "volumes", "params": params }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["totalItems"], 0);
    }
    assert_eq!(upstreams.books.calls(), 1);

    let call = upstreams.books.last_call.lock().unwrap().clone().unwrap();
    assert_eq!(call.path, "volumes");
    assert!(call.query.contains(&("q".to_string(), "dune".to_string())));
}

#[actix_web::test]
async fn providers_keep_separate_cache_entries() {
    let upstreams = Upstreams::default();
    let app = proxy_app!(upstreams);
    let user = Uuid::new_v4();

    for (uri, expected) in [
        ("/api/metadata/tmdb", json!({ "results": [{ "id": 603 }] })),
        ("/api/metadata/books", json!({ "totalItems": 0 })),
    ] {
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header(bearer(user))
            .set_json(json!({ "endpoint": "search", "params": { "q": "matrix" } }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, expected);
    }
    assert_eq!(upstreams.tmdb.calls(), 1);
    assert_eq!(upstreams.books.calls(), 1);
}
