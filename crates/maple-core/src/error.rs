//! Error types for the maple-core crate
//!
//! The HTTP boundary maps these onto status codes and the field-error
//! envelope; the kinds here are the stable, user-visible taxonomy.

use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors from the domain engine
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed request, missing field, out-of-range enum
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    /// Caller lacks permission on the target entity
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Entity absent, or soft-deleted and the caller lacks the admin view
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate membership, version clash, or state-machine violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// KDF, AEAD, or sealed-box failure
    #[error(transparent)]
    Crypto(#[from] maple_crypto::CryptoError),

    /// Object missing, size mismatch, or expired URL during upload
    #[error("upload integrity failure: {0}")]
    UploadIntegrity(String),

    /// Store or storage unavailable; retryable
    #[error("transient failure: {0}")]
    Transient(String),

    /// Invariant violation; not retryable
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl CoreError {
    /// Build a validation error for a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a client should retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<maple_store::StoreError> for CoreError {
    fn from(err: maple_store::StoreError) -> Self {
        use maple_store::StoreError;
        match err {
            StoreError::NotFound(path) => {
                Self::UploadIntegrity(format!("object missing at {path}"))
            }
            StoreError::Unavailable(msg) => Self::Transient(msg),
            StoreError::TtlTooLong { .. } | StoreError::InvalidPath(_) => {
                Self::Validation {
                    field: "url".to_string(),
                    message: err.to_string(),
                }
            }
            StoreError::InvalidSignature(msg) => Self::UploadIntegrity(msg),
        }
    }
}
