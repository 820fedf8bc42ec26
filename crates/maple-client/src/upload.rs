//! Client half of the three-step upload protocol
//!
//! Encrypt first, then: create the pending record, stream ciphertext to
//! the presigned URL, complete with the observed sizes. Uploads run under
//! a semaphore (at most four in flight), persist an intent before the
//! first network call, and re-request fresh URLs when the old ones
//! expire. A response that substitutes the client-assigned file id is
//! refused outright.

use crate::{
    api::ApiClient,
    localdb::{LocalFile, LocalStore, UploadIntent},
    ClientError, Result,
};
use bytes::Bytes;
use chrono::Utc;
use maple_core::api::{CompleteUploadRequest, CreatePendingFileRequest};
use maple_core::{types::FileState, Oid};
use maple_crypto::{aead, keys::SymmetricKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

/// Plaintext file metadata, sealed under the file key before upload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub created: chrono::DateTime<Utc>,
    pub modified: chrono::DateTime<Utc>,
}

/// Everything produced by the local encryption pass
pub struct EncryptedUpload {
    pub file_id: Oid,
    pub ciphertext: Bytes,
    pub request: CreatePendingFileRequest,
    pub file_key: SymmetricKey,
}

/// Encrypt a file for upload into a collection
///
/// A fresh file key is drawn, wrapped under the collection key; metadata
/// is sealed under the file key; the integrity tag is the hex SHA-256 of
/// the ciphertext.
pub fn encrypt_for_upload(
    collection_id: Oid,
    collection_key: &SymmetricKey,
    metadata: &FileMetadata,
    plaintext: &[u8],
) -> Result<EncryptedUpload> {
    let file_id = Oid::new();
    let file_key = SymmetricKey::generate();

    let content_blob = aead::encrypt(&file_key, plaintext)?;
    let mut ciphertext = Vec::with_capacity(content_blob.nonce.len() + content_blob.ciphertext.len());
    ciphertext.extend_from_slice(&content_blob.nonce);
    ciphertext.extend_from_slice(&content_blob.ciphertext);

    let metadata_json = serde_json::to_vec(metadata)?;
    let encrypted_metadata = aead::encrypt_string_field(&file_key, &metadata_json)?;
    let encrypted_file_key = aead::encrypt(collection_key, file_key.as_bytes())?;
    let encrypted_hash = hex::encode(Sha256::digest(&ciphertext));

    let request = CreatePendingFileRequest {
        id: file_id,
        collection_id,
        encrypted_metadata,
        encrypted_file_key,
        encryption_version: 1,
        encrypted_hash,
        expected_file_size: ciphertext.len() as u64,
        expected_thumbnail_size: None,
    };

    Ok(EncryptedUpload {
        file_id,
        ciphertext: Bytes::from(ciphertext),
        request,
        file_key,
    })
}

/// Decrypt downloaded ciphertext with the file key
pub fn decrypt_download(file_key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < maple_crypto::NONCE_SIZE + maple_crypto::TAG_SIZE {
        return Err(maple_crypto::CryptoError::CorruptEnvelope(
            "downloaded object too short".to_string(),
        )
        .into());
    }
    let blob = maple_crypto::EncryptedBlob {
        nonce: ciphertext[..maple_crypto::NONCE_SIZE].to_vec(),
        ciphertext: ciphertext[maple_crypto::NONCE_SIZE..].to_vec(),
    };
    Ok(aead::decrypt(file_key, &blob)?)
}

/// Runs uploads with bounded concurrency
pub struct UploadScheduler {
    permits: Arc<Semaphore>,
}

impl Default for UploadScheduler {
    fn default() -> Self {
        Self::new(crate::DEFAULT_UPLOAD_CONCURRENCY)
    }
}

impl UploadScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Drive one file through the full three-step protocol
    ///
    /// The upload intent is persisted before the first network call and
    /// cleared only after completion, so a crash anywhere in between
    /// resumes on the next run.
    #[instrument(skip_all, fields(collection_id = %collection_id))]
    pub async fn upload(
        &self,
        api: &ApiClient,
        local: &mut LocalStore,
        collection_id: Oid,
        collection_key: &SymmetricKey,
        metadata: FileMetadata,
        plaintext: &[u8],
        source_path: std::path::PathBuf,
    ) -> Result<Oid> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ClientError::LocalState(e.to_string()))?;

        let encrypted = encrypt_for_upload(collection_id, collection_key, &metadata, plaintext)?;
        let file_id = encrypted.file_id;

        local.push_upload_intent(UploadIntent {
            file_id,
            collection_id,
            source_path,
            created_at: Utc::now(),
        });
        local.save()?;

        // Step one: register the pending record.
        let created = api.create_pending_file(&encrypted.request).await?;
        if created.file.id != file_id {
            return Err(ClientError::IdMismatch {
                expected: file_id.to_hex(),
                got: created.file.id.to_hex(),
            });
        }

        // Step two: stream ciphertext. An expired URL earns exactly one
        // fresh-URL retry before the error propagates.
        let mut upload_url = created.upload_url;
        if created.expires_at < Utc::now() {
            upload_url = api.fresh_upload_url(file_id).await?.upload_url;
        }
        if let Err(first) = api.put_presigned(&upload_url, encrypted.ciphertext.clone()).await {
            debug!(file_id = %file_id, error = %first, "presigned PUT failed; retrying with a fresh url");
            let fresh = api.fresh_upload_url(file_id).await?;
            api.put_presigned(&fresh.upload_url, encrypted.ciphertext.clone())
                .await?;
        }

        // Step three: verify and activate.
        let completed = api
            .complete_upload(
                file_id,
                &CompleteUploadRequest {
                    actual_file_size: encrypted.ciphertext.len() as u64,
                    actual_thumbnail_size: None,
                    upload_confirmed: true,
                    thumbnail_upload_confirmed: false,
                },
            )
            .await?;
        if completed.file.id != file_id {
            return Err(ClientError::IdMismatch {
                expected: file_id.to_hex(),
                got: completed.file.id.to_hex(),
            });
        }

        local.upsert_file(LocalFile {
            id: file_id,
            collection_id,
            version: completed.file.version,
            state: FileState::Active,
            name: Some(metadata.name.clone()),
            locked: false,
            plaintext_path: None,
        });
        local.pop_upload_intent(file_id);
        local.save()?;

        info!(file_id = %file_id, bytes = encrypted.ciphertext.len(), "upload complete");
        Ok(file_id)
    }
}
