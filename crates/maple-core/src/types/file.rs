//! File metadata entity
//!
//! A file record is the cloud's witness of one encrypted object (plus an
//! optional thumbnail) in object storage. All descriptive fields are
//! ciphertext; the cloud sees only sizes, object keys, and lifecycle
//! state.

use crate::oid::Oid;
use chrono::{DateTime, Utc};
use maple_crypto::aead::EncryptedBlob;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a file record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Created, upload not yet verified; invisible to normal reads
    Pending,
    Active,
    Deleted,
    Archived,
}

/// Metadata for one encrypted file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Oid,
    pub collection_id: Oid,
    pub owner_id: Oid,
    pub created_by_user_id: Oid,
    /// JSON `{name, mime_type, size, created, modified}` sealed under the
    /// file key, compact base64 form
    pub encrypted_metadata: String,
    /// File key wrapped under the collection key
    pub encrypted_file_key: EncryptedBlob,
    /// Version of the encryption format the client used
    pub encryption_version: u32,
    /// Client-computed integrity tag over the ciphertext
    pub encrypted_hash: String,
    /// Object-store path of the content; opaque to the cloud
    pub file_object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_object_key: Option<String>,
    /// Ciphertext size in bytes (expected until verified, then actual)
    pub encrypted_file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_thumbnail_size: Option<u64>,
    pub state: FileState,
    pub version: u64,
    #[serde(default)]
    pub tombstone_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether normal (non-admin, non-sync) reads should see this record
    pub fn visible(&self) -> bool {
        self.state == FileState::Active
    }
}
