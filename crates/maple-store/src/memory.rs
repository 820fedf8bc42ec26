//! In-memory object store
//!
//! Backs tests and single-node deployments. Bytes live in a concurrent
//! map keyed by object path; presigned URLs point at the service's
//! `/storage` surface and carry signatures from the shared [`UrlSigner`].

use crate::{
    object::{object_path, ObjectStore, PresignedUrl},
    presign::{SignedMethod, UrlSigner},
    Result, StoreError,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// An in-memory object store
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, Bytes>>,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    /// Create a store minting URLs under the given base URL
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            signer,
        }
    }

    /// The signer, for the HTTP surface that validates presigned requests
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Store bytes at an explicit path (the presigned PUT surface)
    pub fn put_raw(&self, path: &str, data: Bytes) {
        self.objects.insert(path.to_string(), data);
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Total size of all stored objects
    pub fn total_size(&self) -> u64 {
        self.objects.iter().map(|e| e.value().len() as u64).sum()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store_encrypted_data(
        &self,
        owner_id: &str,
        file_id: &str,
        data: Bytes,
    ) -> Result<String> {
        let path = object_path(owner_id, file_id);
        self.objects.insert(path.clone(), data);
        Ok(path)
    }

    async fn get_encrypted_data(&self, path: &str) -> Result<Bytes> {
        self.objects
            .get(path)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn delete_encrypted_data(&self, path: &str) -> Result<()> {
        self.objects.remove(path);
        Ok(())
    }

    async fn presigned_download(&self, path: &str, ttl: Duration) -> Result<PresignedUrl> {
        let (url, expires_at) = self.signer.sign(SignedMethod::Get, path, ttl)?;
        Ok(PresignedUrl { url, expires_at })
    }

    async fn presigned_upload(&self, path: &str, ttl: Duration) -> Result<PresignedUrl> {
        let (url, expires_at) = self.signer.sign(SignedMethod::Put, path, ttl)?;
        Ok(PresignedUrl { url, expires_at })
    }

    async fn verify_exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.contains_key(path))
    }

    async fn get_size(&self, path: &str) -> Result<u64> {
        self.objects
            .get(path)
            .map(|e| e.value().len() as u64)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}
