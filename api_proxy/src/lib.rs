use std::{sync::Arc, time::Duration};

use actix_web::web;
use cache::CacheStore;
use common::{env_config::Config, error::Res, http::json_config};
use upstream::{HttpUpstream, Upstream};

pub mod routes {
    pub mod ai;
    pub mod metadata;
}
pub mod upstream;

mod dtos {
    pub(crate) mod completion;
    pub(crate) mod metadata;
}

/// Upstream clients and the metadata cache shared by the proxy routes.
pub struct ProxyState {
    pub openai: Arc<dyn Upstream>,
    pub tmdb: Arc<dyn Upstream>,
    pub books: Arc<dyn Upstream>,
    pub cache: Arc<dyn CacheStore>,
    pub cache_ttl: Duration,
}

impl ProxyState {
    pub fn from_config(config: &Config, cache: Arc<dyn CacheStore>) -> Res<Self> {
        let timeout = Duration::from_secs(config.upstream_timeout_secs);
        Ok(ProxyState {
            openai: Arc::new(HttpUpstream::openai(&config.openai, timeout)?),
            tmdb: Arc::new(HttpUpstream::tmdb(&config.tmdb, timeout)?),
            books: Arc::new(HttpUpstream::google_books(&config.google_books, timeout)?),
            cache,
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
        })
    }
}

pub fn mount_ai() -> actix_web::Scope {
    web::scope("/ai")
        .app_data(json_config())
        .service(routes::ai::post_completions)
}

pub fn mount_metadata() -> actix_web::Scope {
    web::scope("/metadata")
        .app_data(json_config())
        .service(routes::metadata::post_tmdb)
        .service(routes::metadata::post_books)
}
