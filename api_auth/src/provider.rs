use async_trait::async_trait;
use common::{error::Res, identity::AuthUser};

/// Exchanges a bearer token for the identity it was issued to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `AppError::Unauthorized` when the token is rejected.
    async fn verify(&self, token: &str) -> Res<AuthUser>;
}
