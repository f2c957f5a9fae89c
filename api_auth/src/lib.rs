use std::sync::Arc;

use common::env_config::Config;
use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}
pub mod services {
    pub mod auth_client;
    pub mod jwt;
}
pub mod provider;

pub use provider::IdentityProvider;
pub use services::{auth_client::SupabaseAuthClient, jwt::JwtIdentityProvider};

// Auth middleware
pub fn auth_middleware(provider: Arc<dyn IdentityProvider>) -> AuthMiddleware {
    AuthMiddleware::new(provider)
}

/// Picks local JWT verification when the project secret is configured,
/// otherwise verifies every token against the identity provider.
pub fn identity_provider(config: &Config) -> Arc<dyn IdentityProvider> {
    match &config.supabase.jwt_secret {
        Some(secret) => {
            log::info!("Verifying access tokens locally with the project JWT secret");
            Arc::new(JwtIdentityProvider::new(secret))
        }
        None => Arc::new(SupabaseAuthClient::new(
            config.supabase.url.clone(),
            config.supabase.anon_key.clone(),
        )),
    }
}
