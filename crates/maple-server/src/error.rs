//! Error envelope and status mapping
//!
//! 4xx/5xx bodies are `{field_name: message, …}` or
//! `{"non_field_error": message}`; field keys drive client-side form
//! validation. Cryptographic failures collapse to one generic message so
//! nothing leaks about which step failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use maple_core::CoreError;
use serde_json::json;
use thiserror::Error;

/// API-boundary error
#[derive(Error, Debug)]
pub enum ApiError {
    /// No or malformed credentials
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Request refused at the edge (country blocklist)
    #[error("access from this region is not available")]
    RegionBlocked,

    /// Per-account rate limit exceeded
    #[error("too many requests")]
    RateLimited,

    /// Domain error, mapped by kind
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Crypto error outside the domain layer (token handling)
    #[error(transparent)]
    Crypto(#[from] maple_crypto::CryptoError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::RegionBlocked => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Crypto(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Core(core) => match core {
                CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
                CoreError::Unauthorized(_) => StatusCode::FORBIDDEN,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Conflict(_) => StatusCode::CONFLICT,
                CoreError::Crypto(_) | CoreError::UploadIntegrity(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn envelope(&self) -> serde_json::Value {
        match self {
            Self::Core(CoreError::Validation { field, message }) => {
                let mut fields = serde_json::Map::new();
                fields.insert(field.clone(), serde_json::Value::String(message.clone()));
                serde_json::Value::Object(fields)
            }
            Self::Core(CoreError::Crypto(_)) | Self::Crypto(_) => {
                json!({ "non_field_error": "decryption failed (wrong password?)" })
            }
            other => json!({ "non_field_error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status.as_u16(), "request rejected");
        }
        (status, Json(self.envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_uses_field_key() {
        let err = ApiError::Core(CoreError::validation("encrypted_name", "must not be empty"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.envelope()["encrypted_name"], "must not be empty");
    }

    #[test]
    fn test_crypto_is_generic() {
        let err = ApiError::Core(CoreError::Crypto(maple_crypto::CryptoError::AeadAuthFailure));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = err.envelope();
        assert_eq!(body["non_field_error"], "decryption failed (wrong password?)");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Core(CoreError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Core(CoreError::Conflict("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Core(CoreError::Unauthorized("x".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Core(CoreError::UploadIntegrity("x".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Unauthenticated("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
