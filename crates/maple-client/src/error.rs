//! Error types for the maple-client crate

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias using `ClientError`
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from the desktop agent
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error envelope
    #[error("remote error ({status}): {}", format_fields(.fields))]
    Api {
        status: u16,
        fields: HashMap<String, String>,
    },

    /// Local cryptographic failure
    #[error(transparent)]
    Crypto(#[from] maple_crypto::CryptoError),

    /// No unlocked session; log in (or pass the password) first
    #[error("not logged in: {0}")]
    NotLoggedIn(String),

    /// The server answered with a different id than the client assigned
    #[error("server substituted id {got} for {expected}; refusing the response")]
    IdMismatch { expected: String, got: String },

    /// Keystore or local-database failure
    #[error("local state error: {0}")]
    LocalState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the operation is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// CLI exit code: 1 for user errors, 2 for remote failures
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Http(_) | Self::Api { .. } => 2,
            _ => 1,
        }
    }
}

fn format_fields(fields: &HashMap<String, String>) -> String {
    if fields.is_empty() {
        return "unknown error".to_string();
    }
    let mut parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    parts.sort();
    parts.join("; ")
}
