//! Typed HTTP client for the MapleFile service
//!
//! Thin wrapper over reqwest: bearer auth, the JSON error envelope, and
//! exponential backoff on transient failures (base 500 ms, cap 30 s, 10%
//! jitter). Bulk bytes go straight to presigned URLs with no service
//! involvement.

use crate::{ClientConfig, ClientError, Result};
use bytes::Bytes;
use maple_core::api::*;
use maple_core::{
    sync::{CollectionSyncItem, FileSyncItem, SyncCursor, SyncPage},
    types::Collection,
    types::FileRecord,
    Oid,
};
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 4;

/// The MapleFile API client
pub struct ApiClient {
    config: ClientConfig,
    http: Client,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client from configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Http)?;
        Ok(Self {
            config,
            http,
            token: None,
        })
    }

    /// Attach the bearer token used by authenticated calls
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Replace the bearer token in place (after a refresh)
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    fn url(&self, path: &str) -> String {
        format!("{}/maplefile/api/v1{path}", self.config.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<Vec<(String, String)>>,
        body: Option<serde_json::Value>,
        authenticated: bool,
    ) -> Result<T> {
        let url = self.url(path);
        let mut delay = BACKOFF_BASE;

        for attempt in 1..=MAX_ATTEMPTS {
            let mut rb = self.http.request(method.clone(), &url);
            if authenticated {
                let token = self
                    .token
                    .as_deref()
                    .ok_or_else(|| ClientError::NotLoggedIn("no access token".to_string()))?;
                rb = rb.bearer_auth(token);
            }
            if let Some(q) = &query {
                rb = rb.query(q);
            }
            if let Some(b) = &body {
                rb = rb.json(b);
            }

            let outcome = match rb.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<T>().await?);
                    }
                    Err(Self::envelope_error(status, response).await)
                }
                Err(e) => Err(ClientError::Http(e)),
            };

            match outcome {
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    let jittered = Self::jitter(delay);
                    debug!(attempt, delay_ms = jittered.as_millis() as u64, "retrying after transient failure");
                    tokio::time::sleep(jittered).await;
                    delay = (delay * 2).min(BACKOFF_CAP);
                }
                other => return other,
            }
        }
        unreachable!("retry loop always returns by the last attempt")
    }

    async fn envelope_error(status: StatusCode, response: reqwest::Response) -> ClientError {
        let fields: HashMap<String, String> = response.json().await.unwrap_or_default();
        ClientError::Api {
            status: status.as_u16(),
            fields,
        }
    }

    fn jitter(delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(0.9..=1.1);
        delay.mul_f64(factor)
    }

    // ==================== Accounts & sessions ====================

    #[instrument(skip(self, req))]
    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse> {
        self.send(Method::POST, "/register", None, Some(serde_json::to_value(req)?), false)
            .await
    }

    #[instrument(skip(self))]
    pub async fn request_ott(&self, email: &str) -> Result<serde_json::Value> {
        let req = RequestOttRequest {
            email: email.to_string(),
        };
        self.send(Method::POST, "/request-ott", None, Some(serde_json::to_value(req)?), false)
            .await
    }

    #[instrument(skip(self, code))]
    pub async fn verify_ott(&self, email: &str, code: &str) -> Result<VerifyOttResponse> {
        let req = VerifyOttRequest {
            email: email.to_string(),
            code: code.to_string(),
        };
        self.send(Method::POST, "/verify-ott", None, Some(serde_json::to_value(req)?), false)
            .await
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let req = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.send(Method::POST, "/token/refresh", None, Some(serde_json::to_value(req)?), false)
            .await
    }

    pub async fn me(&self) -> Result<MeResponse> {
        self.send(Method::GET, "/me", None, None, true).await
    }

    pub async fn update_me(&self, req: &UpdateMeRequest) -> Result<MeResponse> {
        self.send(Method::PATCH, "/me", None, Some(serde_json::to_value(req)?), true)
            .await
    }

    pub async fn lookup_user(&self, email: &str) -> Result<LookupResponse> {
        self.send(
            Method::GET,
            "/users/lookup",
            Some(vec![("email".to_string(), email.to_string())]),
            None,
            true,
        )
        .await
    }

    // ==================== Collections ====================

    #[instrument(skip(self, req))]
    pub async fn create_collection(&self, req: &CreateCollectionRequest) -> Result<Collection> {
        self.send(Method::POST, "/collections", None, Some(serde_json::to_value(req)?), true)
            .await
    }

    pub async fn list_collections(&self) -> Result<CollectionListResponse> {
        self.send(Method::GET, "/collections", None, None, true).await
    }

    pub async fn get_collection(&self, id: Oid) -> Result<Collection> {
        self.send(Method::GET, &format!("/collections/{id}"), None, None, true)
            .await
    }

    pub async fn update_collection(
        &self,
        id: Oid,
        req: &UpdateCollectionRequest,
    ) -> Result<Collection> {
        self.send(
            Method::PATCH,
            &format!("/collections/{id}"),
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    pub async fn delete_collection(&self, id: Oid) -> Result<CollectionDeleteResponse> {
        self.send(Method::DELETE, &format!("/collections/{id}"), None, None, true)
            .await
    }

    pub async fn restore_collection(
        &self,
        id: Oid,
        req: &RestoreCollectionRequest,
    ) -> Result<Collection> {
        self.send(
            Method::POST,
            &format!("/collections/{id}/restore"),
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    pub async fn move_collection(&self, id: Oid, req: &MoveCollectionRequest) -> Result<Collection> {
        self.send(
            Method::POST,
            &format!("/collections/{id}/move"),
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    pub async fn get_hierarchy(&self, id: Oid) -> Result<HierarchyNode> {
        self.send(Method::GET, &format!("/collections/{id}/hierarchy"), None, None, true)
            .await
    }

    #[instrument(skip(self, req))]
    pub async fn add_member(&self, id: Oid, req: &ShareCollectionRequest) -> Result<Collection> {
        self.send(
            Method::POST,
            &format!("/collections/{id}/members"),
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    pub async fn update_member(
        &self,
        id: Oid,
        recipient: Oid,
        req: &UpdateMemberRequest,
    ) -> Result<Collection> {
        self.send(
            Method::PATCH,
            &format!("/collections/{id}/members/{recipient}"),
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    pub async fn remove_member(&self, id: Oid, recipient: Oid) -> Result<MemberRemoveResponse> {
        self.send(
            Method::DELETE,
            &format!("/collections/{id}/members/{recipient}"),
            None,
            None,
            true,
        )
        .await
    }

    // ==================== Files ====================

    #[instrument(skip(self, req))]
    pub async fn create_pending_file(
        &self,
        req: &CreatePendingFileRequest,
    ) -> Result<CreatePendingFileResponse> {
        self.send(Method::POST, "/files", None, Some(serde_json::to_value(req)?), true)
            .await
    }

    pub async fn list_files(&self, collection_id: Option<Oid>) -> Result<FileListResponse> {
        let query = collection_id
            .map(|id| vec![("collection_id".to_string(), id.to_hex())]);
        self.send(Method::GET, "/files", query, None, true).await
    }

    pub async fn get_file(&self, id: Oid) -> Result<FileRecord> {
        self.send(Method::GET, &format!("/files/{id}"), None, None, true)
            .await
    }

    pub async fn fresh_upload_url(&self, id: Oid) -> Result<UploadUrlResponse> {
        self.send(Method::GET, &format!("/files/{id}/upload-url"), None, None, true)
            .await
    }

    pub async fn complete_upload(
        &self,
        id: Oid,
        req: &CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse> {
        self.send(
            Method::POST,
            &format!("/files/{id}/complete"),
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    pub async fn download_url(&self, id: Oid) -> Result<DownloadUrlResponse> {
        self.send(Method::GET, &format!("/files/{id}/download-url"), None, None, true)
            .await
    }

    pub async fn delete_file(&self, id: Oid) -> Result<FileRecord> {
        self.send(Method::DELETE, &format!("/files/{id}"), None, None, true)
            .await
    }

    pub async fn delete_files(&self, ids: Vec<Oid>) -> Result<BatchDeleteResponse> {
        let req = BatchDeleteRequest { ids };
        self.send(
            Method::DELETE,
            "/files/multiple",
            None,
            Some(serde_json::to_value(req)?),
            true,
        )
        .await
    }

    // ==================== Sync feeds ====================

    pub async fn sync_collections(
        &self,
        cursor: Option<&SyncCursor>,
        limit: Option<usize>,
    ) -> Result<SyncPage<CollectionSyncItem>> {
        self.send(Method::GET, "/sync/collections", Self::sync_query(cursor, limit)?, None, true)
            .await
    }

    pub async fn sync_files(
        &self,
        cursor: Option<&SyncCursor>,
        limit: Option<usize>,
    ) -> Result<SyncPage<FileSyncItem>> {
        self.send(Method::GET, "/sync/files", Self::sync_query(cursor, limit)?, None, true)
            .await
    }

    fn sync_query(
        cursor: Option<&SyncCursor>,
        limit: Option<usize>,
    ) -> Result<Option<Vec<(String, String)>>> {
        let mut query = Vec::new();
        if let Some(c) = cursor {
            query.push(("cursor".to_string(), serde_json::to_string(c)?));
        }
        if let Some(l) = limit {
            query.push(("limit".to_string(), l.to_string()));
        }
        Ok(if query.is_empty() { None } else { Some(query) })
    }

    // ==================== Bulk bytes ====================

    /// Stream ciphertext to a presigned PUT URL; no service involvement
    #[instrument(skip(self, data))]
    pub async fn put_presigned(&self, url: &str, data: Bytes) -> Result<()> {
        let response = self.http.put(url).body(data).send().await?;
        if !response.status().is_success() {
            return Err(Self::envelope_error(response.status(), response).await);
        }
        Ok(())
    }

    /// Fetch ciphertext from a presigned GET URL
    #[instrument(skip(self))]
    pub async fn get_presigned(&self, url: &str) -> Result<Bytes> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::envelope_error(response.status(), response).await);
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let j = ApiClient::jitter(base);
            assert!(j >= Duration::from_millis(900) && j <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_url_building() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:8000")).unwrap();
        assert_eq!(
            client.url("/collections"),
            "http://localhost:8000/maplefile/api/v1/collections"
        );
    }

    #[tokio::test]
    async fn test_authenticated_call_requires_token() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:1")).unwrap();
        let result = client.me().await;
        assert!(matches!(result, Err(ClientError::NotLoggedIn(_))));
    }
}
