//! The object-storage capability trait and path scheme

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Build the content path for a file: `{owner_id}/{file_id}`
pub fn object_path(owner_id: &str, file_id: &str) -> String {
    format!("{owner_id}/{file_id}")
}

/// Build the thumbnail path for a file: `{owner_id}/{file_id}.thumb`
pub fn thumbnail_path(owner_id: &str, file_id: &str) -> String {
    format!("{owner_id}/{file_id}.thumb")
}

/// A minted presigned URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresignedUrl {
    /// Full HTTPS URL, used by the client verbatim
    pub url: String,
    /// When the URL stops working
    pub expires_at: DateTime<Utc>,
}

/// Capability set for object-storage backends
///
/// Implementations are thread-safe and never interpret stored bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store encrypted bytes for a file, returning the object path
    async fn store_encrypted_data(&self, owner_id: &str, file_id: &str, data: Bytes)
        -> Result<String>;

    /// Fetch encrypted bytes by object path
    async fn get_encrypted_data(&self, path: &str) -> Result<Bytes>;

    /// Delete an object; deleting an absent object is not an error
    async fn delete_encrypted_data(&self, path: &str) -> Result<()>;

    /// Mint a presigned download URL
    async fn presigned_download(&self, path: &str, ttl: Duration) -> Result<PresignedUrl>;

    /// Mint a presigned upload URL
    async fn presigned_upload(&self, path: &str, ttl: Duration) -> Result<PresignedUrl>;

    /// Whether an object exists at the path
    async fn verify_exists(&self, path: &str) -> Result<bool>;

    /// Size in bytes of the object at the path
    async fn get_size(&self, path: &str) -> Result<u64>;
}
