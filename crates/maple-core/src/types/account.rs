//! Account entity

use crate::oid::Oid;
use chrono::{DateTime, Utc};
use maple_crypto::bundle::UserKeyBundle;
use serde::{Deserialize, Serialize};

/// A registered account
///
/// The key bundle is ciphertext throughout; the cloud stores and returns
/// it but can open no part of it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: Oid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub key_bundle: UserKeyBundle,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account around a client-generated key bundle
    pub fn new(id: Oid, email: impl Into<String>, name: Option<String>, key_bundle: UserKeyBundle) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: email.into(),
            name,
            key_bundle,
            created_at: now,
            modified_at: now,
        }
    }
}
