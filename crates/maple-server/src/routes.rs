//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limiter = middleware::create_rate_limiter(state.config.rate_limit_rps);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Unauthenticated: registration, the login exchange, token refresh.
    let public = Router::new()
        .route("/register", post(handlers::register))
        .route("/request-ott", post(handlers::request_ott))
        .route("/verify-ott", post(handlers::verify_ott))
        .route("/token/refresh", post(handlers::refresh_token));

    // Everything else requires a bearer token; rate limiting runs after
    // auth so the key is the account id.
    let protected = Router::new()
        .route("/me", get(handlers::me_get))
        .route("/me", patch(handlers::me_update))
        .route("/users/lookup", get(handlers::lookup_user))
        .route("/collections", post(handlers::create_collection))
        .route("/collections", get(handlers::list_collections))
        .route("/collections/{id}", get(handlers::get_collection))
        .route("/collections/{id}", patch(handlers::update_collection))
        .route("/collections/{id}", delete(handlers::delete_collection))
        .route("/collections/{id}/restore", post(handlers::restore_collection))
        .route("/collections/{id}/archive", post(handlers::archive_collection))
        .route("/collections/{id}/move", post(handlers::move_collection))
        .route("/collections/{id}/hierarchy", get(handlers::get_hierarchy))
        .route("/collections/{id}/members", post(handlers::add_member))
        .route("/collections/{id}/members/{uid}", patch(handlers::update_member))
        .route("/collections/{id}/members/{uid}", delete(handlers::remove_member))
        .route("/files", post(handlers::create_pending_file))
        .route("/files", get(handlers::list_files))
        .route("/files/multiple", delete(handlers::delete_files))
        .route("/files/{id}", get(handlers::get_file))
        .route("/files/{id}", delete(handlers::delete_file))
        .route("/files/{id}/upload-url", get(handlers::get_upload_url))
        .route("/files/{id}/complete", post(handlers::complete_file_upload))
        .route("/files/{id}/download-url", get(handlers::get_download_url))
        .route("/files/{id}/archive", post(handlers::archive_file))
        .route("/files/{id}/restore", post(handlers::restore_file))
        .route("/sync/collections", get(handlers::sync_collections))
        .route("/sync/files", get(handlers::sync_files))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&rate_limiter),
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::auth_middleware,
        ));

    // Presigned byte surface: URL signature is the only credential.
    let storage = Router::new()
        .route("/storage/{*path}", put(handlers::put_object))
        .route("/storage/{*path}", get(handlers::get_object));

    Router::new()
        .nest("/maplefile/api/v1", public.merge(protected))
        .merge(storage)
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::country_block_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
