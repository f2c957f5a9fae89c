mod cors;
mod redis;

use std::{sync::Arc, time::Duration};

use actix_web::{
    App, HttpServer,
    web::{self},
};
use api_proxy::ProxyState;
use api_subs::BillingState;
use cache::{CacheStore, MemoryCacheStore, RedisCacheStore};
use common::env_config::Config;
use db::{MemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore};
use limiter::{FixedWindowLimiter, QuotaTable, RateLimiter, RedisRateLimiter};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();

    // init logger
    if config.console_logging_enabled {
        logger::setup(&config.log_file).expect("Failed to set up logger");
    }

    // subscription records
    let store: Arc<dyn SubscriptionStore> = match &config.database_url {
        Some(url) => {
            let pool = db::setup(url, config.is_production())
                .await
                .expect("Failed to set up database");
            Arc::new(PgSubscriptionStore::new(pool))
        }
        None => {
            log::warn!("DATABASE_URL is not set, subscription records are kept in memory");
            Arc::new(MemorySubscriptionStore::new())
        }
    };

    // shared stores when Redis is configured
    let redis_pool = config.redis_url.as_deref().map(redis::setup_redis);

    let limits = &config.rate_limits;
    let ai_quotas = QuotaTable::scaled(limits.ai_per_window, limits.window_secs);
    let metadata_quotas = QuotaTable::scaled(limits.metadata_per_window, limits.window_secs);
    let (ai_limiter, metadata_limiter): (Arc<dyn RateLimiter>, Arc<dyn RateLimiter>) =
        match &redis_pool {
            Some(pool) => (
                Arc::new(RedisRateLimiter::new("ai", ai_quotas, pool.clone())),
                Arc::new(RedisRateLimiter::new("metadata", metadata_quotas, pool.clone())),
            ),
            None => (
                Arc::new(FixedWindowLimiter::new("ai", ai_quotas)),
                Arc::new(FixedWindowLimiter::new("metadata", metadata_quotas)),
            ),
        };

    let cache_store: Arc<dyn CacheStore> = match &redis_pool {
        Some(pool) => Arc::new(RedisCacheStore::new(pool.clone())),
        None => Arc::new(MemoryCacheStore::new(config.cache.max_entries)),
    };

    // expired windows and cache entries
    let sweep_every = Duration::from_secs(limits.sweep_interval_secs.max(1));
    limiter::spawn_sweeper(ai_limiter.clone(), sweep_every);
    limiter::spawn_sweeper(metadata_limiter.clone(), sweep_every);
    cache::spawn_sweeper(cache_store.clone(), sweep_every);

    let identity = api_auth::identity_provider(&config);
    let proxy = web::Data::new(
        ProxyState::from_config(&config, cache_store).expect("Failed to set up upstream clients"),
    );
    let billing = web::Data::new(BillingState::from_config(&config, store.clone()));

    let origin = config.cors_allowed_origin.clone();
    let global_per_second = limits.global_per_second;
    log::info!(
        "Listening on {}:{} ({})",
        config.server_host,
        config.server_port,
        config.environment
    );

    HttpServer::new(move || {
        App::new()
            .app_data(proxy.clone())
            .app_data(billing.clone())
            .wrap(limiter::global_middleware(global_per_second)) // 3rd
            .wrap(logger::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(api_subs::mount_webhook())
                    .service(
                        api_subs::mount_billing()
                            .wrap(api_auth::auth_middleware(identity.clone())),
                    )
                    .service(
                        api_proxy::mount_ai()
                            .wrap(limiter::user_middleware(ai_limiter.clone(), store.clone()))
                            .wrap(api_auth::auth_middleware(identity.clone())),
                    )
                    .service(
                        api_proxy::mount_metadata()
                            .wrap(limiter::user_middleware(
                                metadata_limiter.clone(),
                                store.clone(),
                            ))
                            .wrap(api_auth::auth_middleware(identity.clone())),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
