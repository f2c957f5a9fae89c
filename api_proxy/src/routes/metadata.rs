use actix_web::{Responder, post, web};
use common::{error::Res, http::Success};

use crate::{
    ProxyState,
    dtos::metadata::MetadataRequest,
    upstream::{Upstream, UpstreamCall},
};

/// Movie and TV lookups against TMDB, cached per endpoint and params.
#[post("/tmdb")]
pub async fn post_tmdb(
    state: web::Data<ProxyState>,
    req: web::Json<MetadataRequest>,
) -> Res<impl Responder> {
    let payload = lookup(&state, state.tmdb.as_ref(), req.into_inner()).await?;
    Success::ok(payload)
}

/// Book lookups against Google Books, cached per endpoint and params.
#[post("/books")]
pub async fn post_books(
    state: web::Data<ProxyState>,
    req: web::Json<MetadataRequest>,
) -> Res<impl Responder> {
    let payload = lookup(&state, state.books.as_ref(), req.into_inner()).await?;
    Success::ok(payload)
}

async fn lookup(
    state: &ProxyState,
    upstream: &dyn Upstream,
    req: MetadataRequest,
) -> Res<serde_json::Value> {
    let lookup = req.validate()?;
    let key = cache::cache_key(upstream.provider(), &lookup.endpoint, &lookup.params);

    cache::get_or_fetch(state.cache.as_ref(), &key, state.cache_ttl, || {
        upstream.call(UpstreamCall::get(&lookup.endpoint, lookup.query()))
    })
    .await
}
