//! The presigned byte surface of the bundled memory object store
//!
//! Production deployments point presigned URLs at real object storage;
//! the single-node build serves them here. Requests authenticate with
//! the URL signature alone - no session token - exactly like a cloud
//! bucket would.

use crate::{ApiError, AppState};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use maple_core::CoreError;
use maple_store::presign::SignedMethod;
use maple_store::ObjectStore;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct PresignQuery {
    pub expires: i64,
    pub sig: String,
}

fn check_signature(
    state: &AppState,
    method: SignedMethod,
    path: &str,
    query: &PresignQuery,
) -> Result<(), ApiError> {
    state
        .objects
        .signer()
        .verify(method, path, query.expires, &query.sig)
        .map_err(|e| CoreError::Unauthorized(format!("presigned url rejected: {e}")).into())
}

/// `PUT /storage/{path}` - step two of the upload protocol lands here
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<PresignQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    check_signature(&state, SignedMethod::Put, &path, &query)?;
    state.objects.put_raw(&path, body);
    Ok(axum::http::StatusCode::OK)
}

/// `GET /storage/{path}` - presigned downloads
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<PresignQuery>,
) -> Result<impl IntoResponse, ApiError> {
    check_signature(&state, SignedMethod::Get, &path, &query)?;
    let bytes = state
        .objects
        .get_encrypted_data(&path)
        .await
        .map_err(|_| ApiError::Core(CoreError::NotFound("object".to_string())))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}
