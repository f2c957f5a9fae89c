use std::{env, str::FromStr, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything the server needs at startup: bind address, worker count,
/// CORS origin, logging preferences, identity provider settings, Stripe
/// credentials and prices, upstream API credentials, rate limit quotas and
/// cache sizing.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the Postgres database holding subscription records.
    /// An in-memory store is used when absent.
    pub database_url: Option<String>,
    /// The URL of a Redis server used as a shared limiter and cache store.
    pub redis_url: Option<String>,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// File the logger appends to next to stdout.
    pub log_file: String,
    /// Public URL of the web application, used for Stripe redirects.
    pub app_url: String,
    /// Identity provider (Supabase) settings.
    pub supabase: SupabaseConfig,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook secret
    pub stripe_webhook_secret: String,
    /// Stripe price ids of the purchasable plans.
    pub stripe_prices: PriceConfig,
    pub openai: UpstreamConfig,
    pub tmdb: UpstreamConfig,
    pub google_books: UpstreamConfig,
    /// Timeout applied to every upstream request, in seconds.
    pub upstream_timeout_secs: u64,
    pub rate_limits: RateLimitConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, Default)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey` on session verification calls.
    pub anon_key: String,
    /// JWT secret of the project. When set, access tokens are verified locally.
    pub jwt_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PriceConfig {
    pub premium_monthly: String,
    pub premium_annual: String,
}

#[derive(Clone, Debug)]
/// Credentials and base URL of a third-party API reached through the proxy.
pub struct UpstreamConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Completions allowed per window for the free tier.
    pub ai_per_window: u32,
    /// Metadata lookups allowed per window for the free tier.
    pub metadata_per_window: u32,
    pub window_secs: u64,
    /// How often expired limiter and cache entries are swept.
    pub sweep_interval_secs: u64,
    /// Process-wide request ceiling, checked before any per-user work.
    pub global_per_second: u32,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            ai_per_window: 10,
            metadata_per_window: 20,
            window_secs: 60,
            sweep_interval_secs: 600,
            global_per_second: 50,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 24 * 60 * 60,
            max_entries: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: "development".to_string(),
            database_url: None,
            redis_url: None,
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            num_workers: 4,
            cors_allowed_origin: "http://localhost:3000".to_string(),
            console_logging_enabled: true,
            log_file: "server.log".to_string(),
            app_url: "http://localhost:3000".to_string(),
            supabase: SupabaseConfig::default(),
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_prices: PriceConfig::default(),
            openai: UpstreamConfig {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
            },
            tmdb: UpstreamConfig {
                api_key: String::new(),
                base_url: "https://api.themoviedb.org/3".to_string(),
            },
            google_books: UpstreamConfig {
                api_key: String::new(),
                base_url: "https://www.googleapis.com/books/v1".to_string(),
            },
            upstream_timeout_secs: 30,
            rate_limits: RateLimitConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Reads an optional variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reads and parses a variable, falling back to `default` when it is unset or invalid.
fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// Loads `.env` first when present. Every optional setting falls back to the
    /// value of `Config::default()`.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `SUPABASE_URL`: Project URL of the identity provider
    /// - `SUPABASE_ANON_KEY`: Public key used for session verification calls
    ///
    /// Optional (with defaults):
    /// - `ENVIRONMENT`: "development" or "production" (default: "development")
    /// - `DATABASE_URL`, `REDIS_URL`: persistence and shared stores (default: none)
    /// - `IP`, `PORT`, `WORKERS`: server binding (default: 127.0.0.1, 8080, 4)
    /// - `CORS_ALLOWED_ORIGIN`, `APP_URL`: front-end origin (default: http://localhost:3000)
    /// - `ENABLE_CONSOLE_LOGGING`, `LOG_FILE`: logging (default: true, server.log)
    /// - `STRIPE_*`, `OPENAI_*`, `TMDB_*`, `GOOGLE_BOOKS_*`: third-party credentials
    /// - `*_RATE_LIMIT_*`, `RATE_LIMIT_WINDOW_SECS`, `SWEEP_INTERVAL_SECS`: quotas
    /// - `METADATA_CACHE_TTL_SECS`, `CACHE_MAX_ENTRIES`: cache sizing
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            server_host: env::var("IP").unwrap_or(defaults.server_host),
            server_port: parsed("PORT", defaults.server_port),
            num_workers: parsed("WORKERS", defaults.num_workers),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or(defaults.cors_allowed_origin),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            log_file: env::var("LOG_FILE").unwrap_or(defaults.log_file),
            app_url: env::var("APP_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.app_url),
            supabase: SupabaseConfig {
                url: env::var("SUPABASE_URL")
                    .expect("SUPABASE_URL must be set")
                    .trim_end_matches('/')
                    .to_string(),
                anon_key: env::var("SUPABASE_ANON_KEY").expect("SUPABASE_ANON_KEY must be set"),
                jwt_secret: optional("SUPABASE_JWT_SECRET"),
            },
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            stripe_prices: PriceConfig {
                premium_monthly: env::var("STRIPE_PRICE_PREMIUM_MONTHLY").unwrap_or_default(),
                premium_annual: env::var("STRIPE_PRICE_PREMIUM_ANNUAL").unwrap_or_default(),
            },
            openai: UpstreamConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai.base_url),
            },
            tmdb: UpstreamConfig {
                api_key: env::var("TMDB_API_KEY").unwrap_or_default(),
                base_url: env::var("TMDB_BASE_URL").unwrap_or(defaults.tmdb.base_url),
            },
            google_books: UpstreamConfig {
                api_key: env::var("GOOGLE_BOOKS_API_KEY").unwrap_or_default(),
                base_url: env::var("GOOGLE_BOOKS_BASE_URL")
                    .unwrap_or(defaults.google_books.base_url),
            },
            upstream_timeout_secs: parsed("UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout_secs),
            rate_limits: RateLimitConfig {
                ai_per_window: parsed(
                    "AI_RATE_LIMIT_PER_WINDOW",
                    defaults.rate_limits.ai_per_window,
                ),
                metadata_per_window: parsed(
                    "METADATA_RATE_LIMIT_PER_WINDOW",
                    defaults.rate_limits.metadata_per_window,
                ),
                window_secs: parsed("RATE_LIMIT_WINDOW_SECS", defaults.rate_limits.window_secs),
                sweep_interval_secs: parsed(
                    "SWEEP_INTERVAL_SECS",
                    defaults.rate_limits.sweep_interval_secs,
                ),
                global_per_second: parsed(
                    "GLOBAL_RATE_LIMIT_PER_SECOND",
                    defaults.rate_limits.global_per_second,
                ),
            },
            cache: CacheConfig {
                ttl_secs: parsed("METADATA_CACHE_TTL_SECS", defaults.cache.ttl_secs),
                max_entries: parsed("CACHE_MAX_ENTRIES", defaults.cache.max_entries),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
