//! Collection and membership handlers

use crate::auth::Session;
use crate::{ApiError, AppState};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use maple_core::api::{
    CollectionDeleteResponse, CollectionListResponse, CreateCollectionRequest, HierarchyNode,
    MemberRemoveResponse, MoveCollectionRequest, RestoreCollectionRequest, ShareCollectionRequest,
    UpdateCollectionRequest, UpdateMemberRequest,
};
use maple_core::{types::Collection, Oid};
use std::sync::Arc;

/// `POST /collections`
pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateCollectionRequest>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.collections.create(session.account_id, req).await?;
    Ok(Json(collection))
}

/// `GET /collections`
pub async fn list_collections(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<CollectionListResponse>, ApiError> {
    let owned = state.collections.list_owned(session.account_id).await?;
    let shared = state.collections.list_shared(session.account_id).await?;
    Ok(Json(CollectionListResponse { owned, shared }))
}

/// `GET /collections/{id}`
pub async fn get_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.collections.get_any_state(session.account_id, id).await?;
    Ok(Json(collection))
}

/// `GET /collections/{id}/hierarchy`
pub async fn get_hierarchy(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<HierarchyNode>, ApiError> {
    let tree = state.collections.hierarchy(session.account_id, id).await?;
    Ok(Json(tree))
}

/// `PATCH /collections/{id}`
pub async fn update_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
    Json(req): Json<UpdateCollectionRequest>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.collections.update(session.account_id, id, req).await?;
    Ok(Json(collection))
}

/// `DELETE /collections/{id}` - soft delete with cascade
pub async fn delete_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<CollectionDeleteResponse>, ApiError> {
    let deleted = state.collections.soft_delete(session.account_id, id).await?;
    Ok(Json(CollectionDeleteResponse { deleted }))
}

/// `POST /collections/{id}/restore`
pub async fn restore_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
    Json(req): Json<RestoreCollectionRequest>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.collections.restore(session.account_id, id, req).await?;
    Ok(Json(collection))
}

/// `POST /collections/{id}/archive`
pub async fn archive_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.collections.archive(session.account_id, id).await?;
    Ok(Json(collection))
}

/// `POST /collections/{id}/move`
pub async fn move_collection(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
    Json(req): Json<MoveCollectionRequest>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.collections.move_to(session.account_id, id, req).await?;
    Ok(Json(collection))
}

/// `POST /collections/{id}/members` - share with propagation
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Oid>,
    Json(req): Json<ShareCollectionRequest>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.sharing.add_member(session.account_id, id, req).await?;
    Ok(Json(collection))
}

/// `PATCH /collections/{id}/members/{uid}`
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((id, recipient_id)): Path<(Oid, Oid)>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state
        .sharing
        .update_permission(session.account_id, id, recipient_id, req.permission_level)
        .await?;
    Ok(Json(collection))
}

/// `DELETE /collections/{id}/members/{uid}` - revoke across the subtree
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((id, recipient_id)): Path<(Oid, Oid)>,
) -> Result<Json<MemberRemoveResponse>, ApiError> {
    let removed = state
        .sharing
        .remove_member(session.account_id, id, recipient_id)
        .await?;
    Ok(Json(MemberRemoveResponse { removed }))
}
