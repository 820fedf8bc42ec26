//! Error types for the maple-store crate

use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from object-storage backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object at the given path
    #[error("object not found: {0}")]
    NotFound(String),

    /// Requested TTL exceeds the ceiling
    #[error("presign TTL {requested_secs}s exceeds the {max_secs}s ceiling")]
    TtlTooLong { requested_secs: u64, max_secs: u64 },

    /// A presigned URL failed signature or expiry checks
    #[error("invalid presigned url: {0}")]
    InvalidSignature(String),

    /// The backend is temporarily unavailable; retryable
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Malformed object path
    #[error("invalid object path: {0}")]
    InvalidPath(String),
}
