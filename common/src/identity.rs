use actix_web::{HttpMessage, dev::ServiceRequest, http::header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Res};

/// Identity resolved by the auth gate and stored in request extensions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &ServiceRequest) -> Res<String> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("No authorization token provided".to_string()))?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("Malformed authorization header".to_string()))
}

pub fn get_auth_user_or_error(req: &ServiceRequest) -> Res<AuthUser> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("No authorization token provided".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn extracts_bearer_token() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def"))
            .to_srv_request();
        assert_eq!(bearer_token(&req).unwrap(), "abc.def");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let req = TestRequest::default().to_srv_request();
        assert!(matches!(bearer_token(&req), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        for value in ["Basic dXNlcjpwYXNz", "bearer abc", "Bearer ", "abc"] {
            let req = TestRequest::default()
                .insert_header((header::AUTHORIZATION, value))
                .to_srv_request();
            assert!(
                matches!(bearer_token(&req), Err(AppError::Unauthorized(_))),
                "{value} should be rejected"
            );
        }
    }
}
