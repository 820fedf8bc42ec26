//! The three-step upload protocol, cloud side
//!
//! Bulk bytes never touch the control plane: step one registers a pending
//! record and mints presigned PUT URLs, step two is the client streaming
//! ciphertext straight to object storage, and step three verifies the
//! object against the claimed sizes before the record turns active. A
//! failed verification leaves the record pending so the client can retry;
//! completing a non-pending record is a state-machine conflict.

use crate::{
    api::{
        CompleteUploadRequest, CompleteUploadResponse, CreatePendingFileRequest,
        CreatePendingFileResponse, DownloadUrlResponse, UploadUrlResponse,
    },
    oid::Oid,
    store::{CollectionStore, FileStore},
    types::{FileRecord, FileState, PermissionLevel},
    pending_gc_grace, CoreError, Result,
};
use chrono::{DateTime, Utc};
use maple_store::{object_path, thumbnail_path, ObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Orchestrates pending → active upload transitions
#[derive(Clone)]
pub struct UploadOrchestrator {
    files: Arc<dyn FileStore>,
    collections: Arc<dyn CollectionStore>,
    objects: Arc<dyn ObjectStore>,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl UploadOrchestrator {
    pub fn new(
        files: Arc<dyn FileStore>,
        collections: Arc<dyn CollectionStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            files,
            collections,
            objects,
            upload_ttl: maple_store::DEFAULT_UPLOAD_TTL,
            download_ttl: maple_store::DEFAULT_DOWNLOAD_TTL,
        }
    }

    /// Override the presigned-URL lifetimes
    pub fn with_ttls(mut self, upload_ttl: Duration, download_ttl: Duration) -> Self {
        self.upload_ttl = upload_ttl;
        self.download_ttl = download_ttl;
        self
    }

    async fn gate_write(&self, caller: Oid, collection_id: Oid) -> Result<crate::types::Collection> {
        let collection = self.collections.get(collection_id).await?;
        if collection.allows(caller, PermissionLevel::ReadWrite) {
            Ok(collection)
        } else if collection.permission_for(caller).is_some() {
            Err(CoreError::Unauthorized(format!(
                "requires ReadWrite on collection {collection_id}"
            )))
        } else {
            Err(CoreError::NotFound("collection".to_string()))
        }
    }

    /// Step one: register a pending record and mint upload URLs
    ///
    /// The client-assigned id is authoritative; a reused id is a conflict.
    pub async fn create_pending(
        &self,
        caller: Oid,
        req: CreatePendingFileRequest,
    ) -> Result<CreatePendingFileResponse> {
        if req.encrypted_metadata.is_empty() {
            return Err(CoreError::validation("encrypted_metadata", "must not be empty"));
        }
        if req.expected_file_size == 0 {
            return Err(CoreError::validation("expected_file_size", "must be positive"));
        }
        let collection = self.gate_write(caller, req.collection_id).await?;

        let owner_hex = collection.owner_id.to_hex();
        let file_hex = req.id.to_hex();
        let now = Utc::now();
        let file = FileRecord {
            id: req.id,
            collection_id: req.collection_id,
            owner_id: collection.owner_id,
            created_by_user_id: caller,
            encrypted_metadata: req.encrypted_metadata,
            encrypted_file_key: req.encrypted_file_key,
            encryption_version: req.encryption_version,
            encrypted_hash: req.encrypted_hash,
            file_object_key: object_path(&owner_hex, &file_hex),
            thumbnail_object_key: req
                .expected_thumbnail_size
                .map(|_| thumbnail_path(&owner_hex, &file_hex)),
            encrypted_file_size: req.expected_file_size,
            encrypted_thumbnail_size: req.expected_thumbnail_size,
            state: FileState::Pending,
            version: 1,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: now,
            modified_at: now,
        };
        let file = self.files.insert(file).await?;

        let upload = self
            .objects
            .presigned_upload(&file.file_object_key, self.upload_ttl)
            .await?;
        let thumbnail_upload_url = match &file.thumbnail_object_key {
            Some(path) => Some(self.objects.presigned_upload(path, self.upload_ttl).await?.url),
            None => None,
        };

        debug!(file_id = %file.id, collection_id = %file.collection_id, "pending file created");
        Ok(CreatePendingFileResponse {
            file,
            upload_url: upload.url,
            thumbnail_upload_url,
            expires_at: upload.expires_at,
        })
    }

    /// Mint fresh upload URLs for a still-pending record (retry after the
    /// original URLs expired)
    pub async fn fresh_upload_url(&self, caller: Oid, file_id: Oid) -> Result<UploadUrlResponse> {
        let file = self.files.get_any_state(file_id).await?;
        if file.state != FileState::Pending {
            return Err(CoreError::Conflict(
                "upload URLs are only minted for pending files".to_string(),
            ));
        }
        self.gate_write(caller, file.collection_id).await?;

        let upload = self
            .objects
            .presigned_upload(&file.file_object_key, self.upload_ttl)
            .await?;
        let thumbnail_upload_url = match &file.thumbnail_object_key {
            Some(path) => Some(self.objects.presigned_upload(path, self.upload_ttl).await?.url),
            None => None,
        };
        Ok(UploadUrlResponse {
            upload_url: upload.url,
            thumbnail_upload_url,
            expires_at: upload.expires_at,
        })
    }

    /// Step three: verify the stored object and activate the record
    pub async fn complete(
        &self,
        caller: Oid,
        file_id: Oid,
        req: CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse> {
        let mut file = self.files.get_any_state(file_id).await?;
        if file.state != FileState::Pending {
            return Err(CoreError::Conflict(format!(
                "cannot complete a file in state {:?}",
                file.state
            )));
        }
        self.gate_write(caller, file.collection_id).await?;

        if !req.upload_confirmed {
            return Err(CoreError::validation(
                "upload_confirmed",
                "client must confirm the upload before completing",
            ));
        }

        if !self.objects.verify_exists(&file.file_object_key).await? {
            return Err(CoreError::UploadIntegrity(format!(
                "no object found at {}",
                file.file_object_key
            )));
        }
        let stored_size = self.objects.get_size(&file.file_object_key).await?;
        if stored_size != req.actual_file_size {
            return Err(CoreError::UploadIntegrity(format!(
                "size mismatch: object holds {stored_size} bytes, client reported {}",
                req.actual_file_size
            )));
        }

        let mut thumbnail_verified = false;
        if let Some(thumb_path) = &file.thumbnail_object_key {
            if req.thumbnail_upload_confirmed {
                let expected = req.actual_thumbnail_size.ok_or_else(|| {
                    CoreError::validation(
                        "actual_thumbnail_size",
                        "required when the thumbnail upload is confirmed",
                    )
                })?;
                if !self.objects.verify_exists(thumb_path).await? {
                    return Err(CoreError::UploadIntegrity(format!(
                        "no thumbnail object found at {thumb_path}"
                    )));
                }
                let thumb_size = self.objects.get_size(thumb_path).await?;
                if thumb_size != expected {
                    return Err(CoreError::UploadIntegrity(format!(
                        "thumbnail size mismatch: object holds {thumb_size} bytes, client reported {expected}"
                    )));
                }
                file.encrypted_thumbnail_size = Some(thumb_size);
                thumbnail_verified = true;
            } else {
                // The thumbnail never arrived; drop its slot.
                self.objects.delete_encrypted_data(thumb_path).await?;
                file.thumbnail_object_key = None;
                file.encrypted_thumbnail_size = None;
            }
        }

        file.encrypted_file_size = stored_size;
        file.state = FileState::Active;
        let file = self.files.update(file).await?;

        info!(file_id = %file.id, size = stored_size, "upload completed");
        Ok(CompleteUploadResponse {
            file,
            upload_verified: true,
            thumbnail_verified,
        })
    }

    /// Mint presigned download URLs for an active file
    pub async fn download_urls(&self, caller: Oid, file_id: Oid) -> Result<DownloadUrlResponse> {
        let file = self.files.get(file_id).await?;
        let collection = self.collections.get_any_state(file.collection_id).await?;
        if !collection.allows(caller, PermissionLevel::ReadOnly) {
            return Err(CoreError::NotFound("file".to_string()));
        }

        let download = self
            .objects
            .presigned_download(&file.file_object_key, self.download_ttl)
            .await?;
        let thumbnail_download_url = match &file.thumbnail_object_key {
            Some(path) => Some(
                self.objects
                    .presigned_download(path, self.download_ttl)
                    .await?
                    .url,
            ),
            None => None,
        };
        Ok(DownloadUrlResponse {
            download_url: download.url,
            thumbnail_download_url,
            expires_at: download.expires_at,
        })
    }

    /// Garbage-collect pending records whose upload URLs are long expired
    ///
    /// Removes the record and any stray objects. Returns how many records
    /// were collected.
    pub async fn collect_expired_pending(&self, now: DateTime<Utc>) -> Result<usize> {
        let ttl = chrono::Duration::from_std(self.upload_ttl)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let cutoff = now - ttl - pending_gc_grace();
        let expired = self.files.list_pending_older_than(cutoff).await?;
        let count = expired.len();

        for file in expired {
            self.objects.delete_encrypted_data(&file.file_object_key).await?;
            if let Some(thumb) = &file.thumbnail_object_key {
                self.objects.delete_encrypted_data(thumb).await?;
            }
            self.files.hard_delete(file.id).await?;
            debug!(file_id = %file.id, "expired pending upload collected");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCollectionStore, MemoryFileStore};
    use crate::types::{Collection, CollectionType};
    use bytes::Bytes;
    use maple_crypto::{aead, envelope::WrappedKey, keys::SymmetricKey};
    use maple_store::{MemoryObjectStore, UrlSigner};

    struct Fixture {
        orchestrator: UploadOrchestrator,
        objects: Arc<MemoryObjectStore>,
        files: Arc<MemoryFileStore>,
        owner: Oid,
        collection_id: Oid,
    }

    async fn fixture() -> Fixture {
        let collections = Arc::new(MemoryCollectionStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let objects = Arc::new(MemoryObjectStore::new(UrlSigner::new(
            "http://localhost:8000",
            [3u8; 32],
        )));
        let owner = Oid::new();

        let collection = Collection::new(
            Oid::new(),
            owner,
            None,
            Vec::new(),
            CollectionType::Folder,
            "bmFtZQ==".to_string(),
            WrappedKey::wrap(&SymmetricKey::generate(), &SymmetricKey::generate(), 1).unwrap(),
        );
        let collection_id = collection.id;
        collections.insert(collection).await.unwrap();

        let orchestrator = UploadOrchestrator::new(
            Arc::clone(&files) as Arc<dyn FileStore>,
            Arc::clone(&collections) as Arc<dyn CollectionStore>,
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
        );
        Fixture {
            orchestrator,
            objects,
            files,
            owner,
            collection_id,
        }
    }

    fn pending_request(fx: &Fixture, size: u64) -> CreatePendingFileRequest {
        let key = SymmetricKey::generate();
        CreatePendingFileRequest {
            id: Oid::new(),
            collection_id: fx.collection_id,
            encrypted_metadata: aead::encrypt_string_field(&key, b"{\"name\":\"img.jpg\"}").unwrap(),
            encrypted_file_key: aead::encrypt(&key, SymmetricKey::generate().as_bytes()).unwrap(),
            encryption_version: 1,
            encrypted_hash: "hash".to_string(),
            expected_file_size: size,
            expected_thumbnail_size: None,
        }
    }

    fn complete_request(size: u64) -> CompleteUploadRequest {
        CompleteUploadRequest {
            actual_file_size: size,
            actual_thumbnail_size: None,
            upload_confirmed: true,
            thumbnail_upload_confirmed: false,
        }
    }

    #[tokio::test]
    async fn test_three_step_happy_path() {
        let fx = fixture().await;
        let req = pending_request(&fx, 10);
        let client_id = req.id;

        let created = fx.orchestrator.create_pending(fx.owner, req).await.unwrap();
        assert_eq!(created.file.id, client_id, "unified id survives");
        assert_eq!(created.file.state, FileState::Pending);
        assert!(created.upload_url.contains("/storage/"));

        // Step two: bytes land in object storage.
        fx.objects
            .put_raw(&created.file.file_object_key, Bytes::from_static(b"0123456789"));

        let done = fx
            .orchestrator
            .complete(fx.owner, client_id, complete_request(10))
            .await
            .unwrap();
        assert!(done.upload_verified);
        assert_eq!(done.file.state, FileState::Active);
        assert_eq!(done.file.id, client_id);
        assert!(done.file.version > created.file.version);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let fx = fixture().await;
        let req = pending_request(&fx, 10);
        fx.orchestrator
            .create_pending(fx.owner, req.clone())
            .await
            .unwrap();

        let result = fx.orchestrator.create_pending(fx.owner, req).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_size_mismatch_stays_pending() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 10))
            .await
            .unwrap();
        fx.objects
            .put_raw(&created.file.file_object_key, Bytes::from_static(b"0123456789"));

        // Client claims one byte more than it stored.
        let result = fx
            .orchestrator
            .complete(fx.owner, created.file.id, complete_request(11))
            .await;
        assert!(matches!(result, Err(CoreError::UploadIntegrity(_))));
        assert_eq!(
            fx.files.get_any_state(created.file.id).await.unwrap().state,
            FileState::Pending
        );

        // Retrying with the correct size succeeds.
        let done = fx
            .orchestrator
            .complete(fx.owner, created.file.id, complete_request(10))
            .await
            .unwrap();
        assert_eq!(done.file.state, FileState::Active);
    }

    #[tokio::test]
    async fn test_missing_object_stays_pending() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 10))
            .await
            .unwrap();

        let result = fx
            .orchestrator
            .complete(fx.owner, created.file.id, complete_request(10))
            .await;
        assert!(matches!(result, Err(CoreError::UploadIntegrity(_))));
        assert_eq!(
            fx.files.get_any_state(created.file.id).await.unwrap().state,
            FileState::Pending
        );
    }

    #[tokio::test]
    async fn test_completing_active_file_conflicts() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 4))
            .await
            .unwrap();
        fx.objects
            .put_raw(&created.file.file_object_key, Bytes::from_static(b"abcd"));
        fx.orchestrator
            .complete(fx.owner, created.file.id, complete_request(4))
            .await
            .unwrap();

        let again = fx
            .orchestrator
            .complete(fx.owner, created.file.id, complete_request(4))
            .await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_fresh_url_only_while_pending() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 4))
            .await
            .unwrap();

        let fresh = fx
            .orchestrator
            .fresh_upload_url(fx.owner, created.file.id)
            .await
            .unwrap();
        assert_ne!(fresh.upload_url, created.upload_url);

        fx.objects
            .put_raw(&created.file.file_object_key, Bytes::from_static(b"abcd"));
        fx.orchestrator
            .complete(fx.owner, created.file.id, complete_request(4))
            .await
            .unwrap();

        assert!(matches!(
            fx.orchestrator.fresh_upload_url(fx.owner, created.file.id).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_invisible_until_complete() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 4))
            .await
            .unwrap();

        assert!(fx.files.get(created.file.id).await.is_err());
        assert!(fx
            .orchestrator
            .download_urls(fx.owner, created.file.id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_gc_collects_stale_pending() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 4))
            .await
            .unwrap();
        fx.objects
            .put_raw(&created.file.file_object_key, Bytes::from_static(b"abcd"));

        // Not yet past expiry + grace.
        assert_eq!(
            fx.orchestrator.collect_expired_pending(Utc::now()).await.unwrap(),
            0
        );

        let later = Utc::now() + chrono::Duration::hours(3);
        assert_eq!(
            fx.orchestrator.collect_expired_pending(later).await.unwrap(),
            1
        );
        assert!(fx.files.get_any_state(created.file.id).await.is_err());
        assert!(!fx
            .objects
            .verify_exists(&created.file.file_object_key)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_download_urls_for_active_file() {
        let fx = fixture().await;
        let created = fx
            .orchestrator
            .create_pending(fx.owner, pending_request(&fx, 4))
            .await
            .unwrap();
        fx.objects
            .put_raw(&created.file.file_object_key, Bytes::from_static(b"abcd"));
        fx.orchestrator
            .complete(fx.owner, created.file.id, complete_request(4))
            .await
            .unwrap();

        let urls = fx
            .orchestrator
            .download_urls(fx.owner, created.file.id)
            .await
            .unwrap();
        assert!(urls.download_url.contains(&created.file.file_object_key));
        assert!(urls.thumbnail_download_url.is_none());
    }
}
