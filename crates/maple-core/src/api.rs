//! Wire DTOs shared by the HTTP service and the client SDK
//!
//! Keeping both halves on one set of serde types is what enforces the
//! wire formats: encrypted string fields are compact base64, binary
//! fields are base64 strings, ids are hex, timestamps are RFC-3339.

use crate::{
    oid::Oid,
    types::{CollectionType, FileRecord, PermissionLevel},
};
use chrono::{DateTime, Utc};
use maple_crypto::{aead::EncryptedBlob, bundle::UserKeyBundle, encoding, envelope::WrappedKey};
use serde::{Deserialize, Serialize};

// ==================== Accounts & sessions ====================

/// `POST /register` - the key bundle is computed entirely client-side
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Client-assigned account id (unified-ID rule applies to accounts too)
    pub id: Oid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub key_bundle: UserKeyBundle,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: Oid,
    pub email: String,
    pub verification_id: String,
}

/// `POST /request-ott`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestOttRequest {
    pub email: String,
}

/// `POST /verify-ott`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyOttRequest {
    pub email: String,
    pub code: String,
}

/// Session tokens, each sealed to the account's public key
///
/// Opening them requires the private key and therefore the password; the
/// cloud hands out capabilities only the real key-holder can use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Sealed access token, base64
    pub encrypted_access_token: String,
    /// Sealed refresh token, base64
    pub encrypted_refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyOttResponse {
    pub account_id: Oid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub key_bundle: UserKeyBundle,
    pub tokens: TokenGrant,
}

/// `POST /token/refresh` - the client has already unsealed the token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Oid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub key_bundle: UserKeyBundle,
}

/// `PATCH /me` - profile changes and key-bundle re-wraps (password change,
/// recovery completion, KDF upgrades)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateMeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_bundle: Option<UserKeyBundle>,
}

/// `GET /users/lookup?email=…` - the public half of an account, for
/// sealing share envelopes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupResponse {
    pub account_id: Oid,
    pub email: String,
    pub public_key: maple_crypto::keys::PublicKey,
    /// Compare out of band before sharing
    pub verification_id: String,
}

// ==================== Collections ====================

/// `POST /collections`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    /// Client-assigned id; the server persists it verbatim
    pub id: Oid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Oid>,
    pub collection_type: CollectionType,
    /// `base64(nonce ‖ ciphertext)` under the collection key
    pub encrypted_name: String,
    /// Collection key wrapped under the owner's master key
    pub encrypted_collection_key: WrappedKey,
}

/// `PATCH /collections/{id}`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateCollectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_collection_key: Option<WrappedKey>,
}

/// Re-encrypted name for one node of a moved subtree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathSegmentUpdate {
    pub collection_id: Oid,
    pub encrypted_name: String,
}

/// `POST /collections/{id}/move` - the client pre-computes the new path
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveCollectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_parent_id: Option<Oid>,
    #[serde(default)]
    pub updated_ancestor_ids: Vec<Oid>,
    #[serde(default)]
    pub updated_path_segments: Vec<PathSegmentUpdate>,
}

/// `POST /collections/{id}/restore`
///
/// Soft delete strips ciphertext, so the client re-supplies the encrypted
/// name and key envelope from its local cache when restoring.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RestoreCollectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_collection_key: Option<WrappedKey>,
}

/// One descendant's collection key sealed for the new member
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DescendantShareKey {
    pub collection_id: Oid,
    #[serde(with = "encoding::base64_bytes")]
    pub encrypted_collection_key: Vec<u8>,
}

/// `POST /collections/{id}/members`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShareCollectionRequest {
    pub recipient_id: Oid,
    pub recipient_email: String,
    pub permission_level: PermissionLevel,
    /// The root collection key sealed to the recipient
    #[serde(with = "encoding::base64_bytes")]
    pub encrypted_collection_key: Vec<u8>,
    /// One sealed envelope per descendant, computed from each descendant's
    /// own key
    #[serde(default)]
    pub descendant_keys: Vec<DescendantShareKey>,
}

/// `PATCH /collections/{id}/members/{uid}`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateMemberRequest {
    pub permission_level: PermissionLevel,
}

/// A collection tree, assembled in memory from the flat store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub collection: crate::types::Collection,
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

/// `GET /collections` - owned and shared-with-me listings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionListResponse {
    pub owned: Vec<crate::types::Collection>,
    pub shared: Vec<crate::types::Collection>,
}

/// `DELETE /collections/{id}` - the ids the cascade touched
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionDeleteResponse {
    pub deleted: Vec<Oid>,
}

/// `DELETE /collections/{id}/members/{uid}` - grants removed across the
/// subtree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberRemoveResponse {
    pub removed: usize,
}

// ==================== Files ====================

/// `POST /files` - step one of the three-step upload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatePendingFileRequest {
    /// Client-assigned id; the server persists it verbatim
    pub id: Oid,
    pub collection_id: Oid,
    pub encrypted_metadata: String,
    pub encrypted_file_key: EncryptedBlob,
    pub encryption_version: u32,
    pub encrypted_hash: String,
    pub expected_file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_thumbnail_size: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatePendingFileResponse {
    pub file: FileRecord,
    pub upload_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_upload_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// `GET /files/{id}/upload-url`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub upload_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_upload_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// `POST /files/{id}/complete` - step three
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    pub actual_file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_thumbnail_size: Option<u64>,
    pub upload_confirmed: bool,
    #[serde(default)]
    pub thumbnail_upload_confirmed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub file: FileRecord,
    pub upload_verified: bool,
    pub thumbnail_verified: bool,
}

/// `GET /files/{id}/download-url`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_download_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// `DELETE /files/multiple`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<Oid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchDeleteResponse {
    pub deleted: Vec<Oid>,
}

/// `GET /files` listings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_crypto::keys::SymmetricKey;

    #[test]
    fn test_share_request_wire_form() {
        let req = ShareCollectionRequest {
            recipient_id: Oid::new(),
            recipient_email: "b@example.com".to_string(),
            permission_level: PermissionLevel::ReadWrite,
            encrypted_collection_key: vec![1u8; 80],
            descendant_keys: vec![DescendantShareKey {
                collection_id: Oid::new(),
                encrypted_collection_key: vec![2u8; 80],
            }],
        };

        let json = serde_json::to_value(&req).unwrap();
        assert!(json["encrypted_collection_key"].is_string());
        assert_eq!(json["permission_level"], "read_write");

        let back: ShareCollectionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.descendant_keys.len(), 1);
        assert_eq!(back.encrypted_collection_key, vec![1u8; 80]);
    }

    #[test]
    fn test_create_pending_request_roundtrip() {
        let key = SymmetricKey::generate();
        let req = CreatePendingFileRequest {
            id: Oid::new(),
            collection_id: Oid::new(),
            encrypted_metadata: maple_crypto::aead::encrypt_string_field(&key, b"{}").unwrap(),
            encrypted_file_key: maple_crypto::aead::encrypt(&key, &[0u8; 32]).unwrap(),
            encryption_version: 1,
            encrypted_hash: "h".to_string(),
            expected_file_size: 42,
            expected_thumbnail_size: None,
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("expected_thumbnail_size"));
        let back: CreatePendingFileRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, req.id);
    }
}
