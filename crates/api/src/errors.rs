//! HTTP error responder.
//!
//! One mapping from the layered error types onto response statuses:
//! validation 400, auth 401, forbidden 403, not-found 404, conflict 409,
//! restricted accounts 418 (a deliberate, distinct status the clients
//! key on), upstream integrations 502.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use coffer_auth::AuthError;
use coffer_core::DomainError;
use coffer_infra::{BucketError, StoreError};
use coffer_mail::MailError;
use coffer_sso::SsoError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Restricted user")]
    Restricted,

    #[error("Refresh Token invalid")]
    InvalidRefreshToken,

    #[error("{provider}: {detail}")]
    Integration { provider: String, detail: String },

    #[error("internal error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Unauthorized(msg) => bearer_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
            ApiError::Restricted => {
                bearer_error(StatusCode::IM_A_TEAPOT, "restricted", "Restricted user".to_string())
            }
            ApiError::InvalidRefreshToken => bearer_error(
                StatusCode::UNAUTHORIZED,
                "refresh_token_invalid",
                "Refresh Token invalid".to_string(),
            ),
            ApiError::Integration { provider, detail } => {
                tracing::error!(provider, "upstream integration failure: {detail}");
                json_error(
                    StatusCode::BAD_GATEWAY,
                    "integration_error",
                    format!("{provider} integration failure"),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn bearer_error(status: StatusCode, code: &'static str, message: String) -> Response {
    let mut response = json_error(status, code, message);
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Bearer"),
    );
    response
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ApiError::Validation(msg),
            DomainError::NotFound => ApiError::NotFound("not found".to_string()),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::Restricted => ApiError::Restricted,
            DomainError::InvalidRefreshToken => ApiError::InvalidRefreshToken,
            DomainError::Integration { provider, detail } => {
                ApiError::Integration { provider, detail }
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_unique_violation() {
            return ApiError::Conflict("already exists".to_string());
        }
        ApiError::Internal(err.to_string())
    }
}

impl From<SsoError> for ApiError {
    fn from(err: SsoError) -> Self {
        match err {
            SsoError::InvalidIdToken(msg) => ApiError::Unauthorized(msg),
            SsoError::Provider {
                provider,
                status,
                body,
            } => ApiError::Integration {
                provider: provider.to_string(),
                detail: format!("{status}: {body}"),
            },
            SsoError::Http(e) => ApiError::Integration {
                provider: "sso".to_string(),
                detail: e.to_string(),
            },
            SsoError::ClientSecret(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::Integration {
            provider: "ses".to_string(),
            detail: err.to_string(),
        }
    }
}

impl From<BucketError> for ApiError {
    fn from(err: BucketError) -> Self {
        match err {
            BucketError::NotFound(key) => ApiError::NotFound(format!("File {key} not found")),
            BucketError::InvalidKey(key) => ApiError::Validation(format!("invalid file key: {key}")),
            BucketError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_maps_to_418() {
        let response = ApiError::Restricted.into_response();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn invalid_refresh_token_maps_to_401() {
        let response = ApiError::InvalidRefreshToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn domain_taxonomy_maps_onto_statuses() {
        let cases = [
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::not_found(), StatusCode::NOT_FOUND),
            (DomainError::conflict("dup"), StatusCode::CONFLICT),
            (DomainError::Restricted, StatusCode::IM_A_TEAPOT),
            (DomainError::InvalidRefreshToken, StatusCode::UNAUTHORIZED),
            (
                DomainError::integration("stripe", "boom"),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
