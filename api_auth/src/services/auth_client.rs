use async_trait::async_trait;
use common::{
    error::{AppError, Res},
    identity::AuthUser,
};
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::provider::IdentityProvider;

/// Subset of the Supabase `GET /auth/v1/user` response we rely on.
#[derive(Debug, Deserialize)]
pub struct SupabaseUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Verifies sessions against the Supabase auth API.
pub struct SupabaseAuthClient {
    client: Client,
    supabase_url: String,
    anon_key: String,
}

impl SupabaseAuthClient {
    pub fn new(supabase_url: String, anon_key: String) -> Self {
        SupabaseAuthClient {
            client: Client::new(),
            supabase_url,
            anon_key,
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn verify(&self, token: &str) -> Res<AuthUser> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.supabase_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                log::error!("Identity provider unreachable: {}", e);
                AppError::Reqwest(e.without_url())
            })?;

        if response.status() != StatusCode::OK {
            let error_response = response
                .json::<serde_json::Value>()
                .await
                .unwrap_or(serde_json::json!({"msg": "Failed to validate token"}));
            let message = error_response["msg"]
                .as_str()
                .or_else(|| error_response["message"].as_str())
                .unwrap_or("Failed to validate token")
                .to_string();
            warn!("Token validation failed: {}", message);
            return Err(AppError::Unauthorized("Invalid token".to_string()));
        }

        let user = response
            .json::<SupabaseUser>()
            .await
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;
        debug!("Token validated successfully for user_id: {}", user.id);

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn unreachable_provider_is_not_an_auth_failure() {
        // nothing listens on port 1
        let client = SupabaseAuthClient::new("http://127.0.0.1:1".to_string(), "anon".to_string());
        let err = client.verify("token").await.unwrap_err();
        assert!(matches!(err, AppError::Reqwest(_)));
    }
}
