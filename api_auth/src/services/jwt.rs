use async_trait::async_trait;
use common::{
    error::{AppError, Res},
    identity::AuthUser,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::IdentityProvider;

/// Claims carried by a Supabase access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: Option<String>,
    pub aud: String,
    pub exp: usize,
}

/// Verifies HS256 access tokens locally with the project JWT secret.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["authenticated"]);
        JwtIdentityProvider {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Res<AuthUser> {
        let token_data = jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                log::debug!("Rejected access token: {}", e);
                AppError::Unauthorized("Invalid token".to_string())
            })?;

        Ok(AuthUser {
            user_id: token_data.claims.sub,
            email: token_data.claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    fn token(sub: Uuid, aud: &str, expires_in: Duration, secret: &str) -> String {
        let claims = AccessClaims {
            sub,
            email: Some("reader@example.com".to_string()),
            aud: aud.to_string(),
            exp: (Utc::now() + expires_in).timestamp() as usize,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[actix_web::test]
    async fn accepts_valid_token() {
        let user_id = Uuid::new_v4();
        let provider = JwtIdentityProvider::new(SECRET);
        let user = provider
            .verify(&token(user_id, "authenticated", Duration::hours(1), SECRET))
            .await
            .unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email.as_deref(), Some("reader@example.com"));
    }

    #[actix_web::test]
    async fn rejects_expired_foreign_or_wrong_audience_tokens() {
        let provider = JwtIdentityProvider::new(SECRET);
        let user_id = Uuid::new_v4();
        let rejected = [
            token(user_id, "authenticated", Duration::hours(-2), SECRET),
            token(user_id, "authenticated", Duration::hours(1), "another-secret-another-secret-1234"),
            token(user_id, "anon", Duration::hours(1), SECRET),
            "not-a-jwt".to_string(),
        ];
        for token in rejected {
            assert!(matches!(
                provider.verify(&token).await,
                Err(AppError::Unauthorized(_))
            ));
        }
    }
}
