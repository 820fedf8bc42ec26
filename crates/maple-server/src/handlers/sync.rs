//! Sync feed handlers
//!
//! The `cursor` query parameter is a URL-encoded JSON object
//! `{"last_modified":"<RFC3339>","last_id":"<hex>"}`.

use crate::auth::Session;
use crate::{ApiError, AppState};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use maple_core::{
    sync::{CollectionSyncItem, FileSyncItem, SyncCursor, SyncPage},
    CoreError,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct SyncQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

fn parse_cursor(raw: &Option<String>) -> Result<Option<SyncCursor>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| CoreError::validation("cursor", format!("malformed cursor: {e}")).into()),
    }
}

/// `GET /sync/collections`
pub async fn sync_collections(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncPage<CollectionSyncItem>>, ApiError> {
    let cursor = parse_cursor(&query.cursor)?;
    let page = state
        .sync
        .collection_feed(session.account_id, cursor, query.limit)
        .await?;
    Ok(Json(page))
}

/// `GET /sync/files`
pub async fn sync_files(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncPage<FileSyncItem>>, ApiError> {
    let cursor = parse_cursor(&query.cursor)?;
    let page = state
        .sync
        .file_feed(session.account_id, cursor, query.limit)
        .await?;
    Ok(Json(page))
}
