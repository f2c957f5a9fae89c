/// Pool of connections shared by the Redis-backed limiter and cache stores.
pub fn setup_redis(redis_url: &str) -> deadpool_redis::Pool {
    let cfg = deadpool_redis::Config::from_url(redis_url);
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("Failed to create pool of Redis connections")
}
