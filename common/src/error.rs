use actix_web::{
    HttpResponse,
    http::{StatusCode, header},
};
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    JWT(#[from] jsonwebtoken::errors::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // === APPLICATION ERRORS ===
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too Many Requests: {message}")]
    RateLimited { message: String, retry_after: u64 },

    #[error("{provider} API Error ({status})")]
    Upstream {
        provider: String,
        status: u16,
        details: serde_json::Value,
    },

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::JWT(_)
            | AppError::Stripe(_)
            | AppError::Redis(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    pub fn to_http_response(&self) -> HttpResponse {
        let internal_json = serde_json::json!({ "error": "Internal server error" });

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(internal_json)
            }
            AppError::JWT(error) => {
                log::error!("JWT error: {}", error);
                HttpResponse::InternalServerError().json(internal_json)
            }
            AppError::Reqwest(error) => {
                log::error!("Reqwest error: {}", error);
                HttpResponse::BadGateway()
                    .json(serde_json::json!({ "error": "Upstream service unavailable" }))
            }
            AppError::Stripe(error) => {
                log::error!("Stripe error: {}", error);
                HttpResponse::InternalServerError().json(internal_json)
            }
            AppError::Redis(error) => {
                log::error!("Redis error: {}", error);
                HttpResponse::InternalServerError().json(internal_json)
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(message)
            | AppError::NotFound(message)
            | AppError::BadRequest(message) => HttpResponse::build(self.status_code())
                .json(serde_json::json!({ "error": message })),
            AppError::RateLimited {
                message,
                retry_after,
            } => HttpResponse::TooManyRequests()
                .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                .json(serde_json::json!({ "error": message, "retryAfter": retry_after })),
            AppError::Upstream {
                provider,
                status,
                details,
            } => {
                log::warn!("{} API responded with {}", provider, status);
                HttpResponse::build(self.status_code()).json(serde_json::json!({
                    "error": format!("{} API Error", provider),
                    "status": status,
                    "details": details,
                }))
            }

            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(internal_json)
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn rate_limited_carries_retry_after() {
        let err = AppError::RateLimited {
            message: "Rate limit exceeded".to_string(),
            retry_after: 42,
        };
        let response = err.to_http_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
        let body = body_json(response).await;
        assert_eq!(body["retryAfter"], 42);
        assert_eq!(body["error"], "Rate limit exceeded");
    }

    #[actix_web::test]
    async fn upstream_status_is_propagated_verbatim() {
        let err = AppError::Upstream {
            provider: "TMDB".to_string(),
            status: 429,
            details: serde_json::json!({ "status_message": "slow down" }),
        };
        let response = err.to_http_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"], "TMDB API Error");
        assert_eq!(body["status"], 429);
        assert_eq!(body["details"]["status_message"], "slow down");
    }

    #[actix_web::test]
    async fn internal_detail_is_not_leaked() {
        let response = AppError::Internal("pool exhausted at 10.0.0.3".to_string()).to_http_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn client_errors_map_to_their_status() {
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
