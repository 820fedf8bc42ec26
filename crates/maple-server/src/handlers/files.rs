//! File metadata and three-step upload handlers

use crate::auth::Session;
use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use maple_core::api::{
    BatchDeleteRequest, BatchDeleteResponse, CompleteUploadRequest, CompleteUploadResponse,
    CreatePendingFileRequest, CreatePendingFileResponse, DownloadUrlResponse, FileListResponse,
    UploadUrlResponse,
};
use maple_core::{types::FileRecord, Oid};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ListFilesQuery {
    pub collection_id: Option<Oid>,
}

/// `POST /files` - step one of the upload protocol
pub async fn create_pending_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreatePendingFileRequest>,
) -> Result<Json<CreatePendingFileResponse>, ApiError> {
    let response = state.uploads.create_pending(session.account_id, req).await?;
    Ok(Json(response))
}

/// `GET /files?collection_id=…` - active files in a collection, or the
/// caller's own files without the filter
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<FileListResponse>, ApiError> {
    let files = match query.collection_id {
        Some(collection_id) => {
            state
                .files
                .list_by_collection(session.account_id, collection_id)
                .await?
        }
        None => state.files.list_by_owner(session.account_id).await?,
    };
    Ok(Json(FileListResponse { files }))
}

/// `GET /files/{id}`
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<FileRecord>, ApiError> {
    let file = state.files.get_any_state(session.account_id, id).await?;
    Ok(Json(file))
}

/// `GET /files/{id}/upload-url` - fresh URLs for a pending record
pub async fn get_upload_url(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let response = state.uploads.fresh_upload_url(session.account_id, id).await?;
    Ok(Json(response))
}

/// `POST /files/{id}/complete` - step three
pub async fn complete_file_upload(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
    Json(req): Json<CompleteUploadRequest>,
) -> Result<Json<CompleteUploadResponse>, ApiError> {
    let response = state.uploads.complete(session.account_id, id, req).await?;
    Ok(Json(response))
}

/// `GET /files/{id}/download-url`
pub async fn get_download_url(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<DownloadUrlResponse>, ApiError> {
    let response = state.uploads.download_urls(session.account_id, id).await?;
    Ok(Json(response))
}

/// `DELETE /files/{id}` - soft delete
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<FileRecord>, ApiError> {
    let file = state.files.soft_delete(session.account_id, id).await?;
    Ok(Json(file))
}

/// `DELETE /files/multiple` - batch soft delete
pub async fn delete_files(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<BatchDeleteRequest>,
) -> Result<Json<BatchDeleteResponse>, ApiError> {
    let deleted = state
        .files
        .soft_delete_many(session.account_id, &req.ids)
        .await?;
    Ok(Json(BatchDeleteResponse { deleted }))
}

/// `POST /files/{id}/archive`
pub async fn archive_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<FileRecord>, ApiError> {
    let file = state.files.archive(session.account_id, id).await?;
    Ok(Json(file))
}

/// `POST /files/{id}/restore`
pub async fn restore_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<FileRecord>, ApiError> {
    let file = state.files.restore(session.account_id, id).await?;
    Ok(Json(file))
}
