//! Account registration, login, token refresh, and profile handlers
//!
//! Registration is entirely client-computed: the request carries a
//! finished key bundle and the service stores it blind. Login is a
//! two-step email one-time-token exchange; delivery is an external
//! concern, so the bundled build surfaces the code through the log.

use crate::auth::{OttEntry, Session, TokenKind};
use crate::{ApiError, AppState};
use axum::{extract::State, Extension, Json};
use chrono::Duration;
use axum::extract::Query;
use maple_core::api::{
    LookupResponse, MeResponse, RefreshRequest, RegisterRequest, RegisterResponse,
    RequestOttRequest, TokenGrant, UpdateMeRequest, VerifyOttRequest, VerifyOttResponse,
};
use maple_core::{types::Account, CoreError};
use std::sync::Arc;
use tracing::info;

/// `POST /register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    if req.email.trim().is_empty() || !req.email.contains('@') {
        return Err(CoreError::validation("email", "a valid email is required").into());
    }
    // The verification mnemonic is deterministic public data; a bundle
    // that disagrees with its own public key is corrupt.
    if !maple_crypto::verification_id_matches(
        &req.key_bundle.public_key,
        &req.key_bundle.verification_id,
    ) {
        return Err(CoreError::validation(
            "verification_id",
            "does not match the public key",
        )
        .into());
    }

    let account = state
        .accounts
        .insert(Account::new(req.id, req.email.trim(), req.name, req.key_bundle))
        .await?;

    info!(account_id = %account.id, "account registered");
    Ok(Json(RegisterResponse {
        id: account.id,
        email: account.email,
        verification_id: account.key_bundle.verification_id,
    }))
}

/// `POST /request-ott`
///
/// Always answers 200 so the endpoint cannot be used to probe which
/// emails exist.
pub async fn request_ott(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequestOttRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = req.email.trim().to_ascii_lowercase();
    if state.accounts.get_by_email(&email).await.is_ok() {
        let ott = OttEntry::generate(Duration::seconds(state.config.ott_ttl_secs as i64));
        // Email delivery is handled out of process; the bundled build
        // surfaces the code through the log for operators and tests.
        info!(email = %email, code = %ott.code, "login code issued");
        state.login_otts.insert(email, ott);
    }
    Ok(Json(serde_json::json!({ "status": "sent" })))
}

/// `POST /verify-ott`
pub async fn verify_ott(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOttRequest>,
) -> Result<Json<VerifyOttResponse>, ApiError> {
    let email = req.email.trim().to_ascii_lowercase();

    let valid = match state.login_otts.get(&email) {
        Some(entry) => !entry.is_expired() && entry.code == req.code.trim(),
        None => false,
    };
    if !valid {
        return Err(ApiError::Unauthenticated("invalid or expired login code".to_string()));
    }
    state.login_otts.remove(&email);

    let account = state.accounts.get_by_email(&email).await?;
    let tokens = state.tokens.issue_sealed_grant(&account)?;

    info!(account_id = %account.id, "login verified");
    Ok(Json(VerifyOttResponse {
        account_id: account.id,
        email: account.email,
        name: account.name,
        key_bundle: account.key_bundle,
        tokens,
    }))
}

/// `POST /token/refresh`
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenGrant>, ApiError> {
    let session = state.tokens.validate(&req.refresh_token, TokenKind::Refresh)?;
    let account = state.accounts.get(session.account_id).await?;
    let tokens = state.tokens.issue_sealed_grant(&account)?;
    Ok(Json(tokens))
}

#[derive(serde::Deserialize)]
pub struct LookupQuery {
    pub email: String,
}

/// `GET /users/lookup?email=…`
///
/// Returns only public material: the recipient id, public key, and
/// verification mnemonic a sharer needs to seal envelopes.
pub async fn lookup_user(
    State(state): State<Arc<AppState>>,
    Extension(_session): Extension<Session>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<LookupResponse>, ApiError> {
    let account = state.accounts.get_by_email(query.email.trim()).await?;
    Ok(Json(LookupResponse {
        account_id: account.id,
        email: account.email,
        public_key: account.key_bundle.public_key,
        verification_id: account.key_bundle.verification_id,
    }))
}

/// `GET /me`
pub async fn me_get(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<MeResponse>, ApiError> {
    let account = state.accounts.get(session.account_id).await?;
    Ok(Json(MeResponse {
        id: account.id,
        email: account.email,
        name: account.name,
        key_bundle: account.key_bundle,
    }))
}

/// `PATCH /me`
///
/// Accepts profile edits and key-bundle re-wraps (password change,
/// recovery completion, KDF upgrade). The public key is pinned: a bundle
/// that swaps it is rejected, since that would silently redirect future
/// shares.
pub async fn me_update(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Json<MeResponse>, ApiError> {
    let mut account = state.accounts.get(session.account_id).await?;

    if let Some(name) = req.name {
        account.name = if name.trim().is_empty() { None } else { Some(name) };
    }
    if let Some(bundle) = req.key_bundle {
        if bundle.public_key != account.key_bundle.public_key {
            return Err(CoreError::validation(
                "key_bundle",
                "the public key cannot change in a re-wrap",
            )
            .into());
        }
        account.key_bundle = bundle;
    }

    let account = state.accounts.update(account).await?;
    Ok(Json(MeResponse {
        id: account.id,
        email: account.email,
        name: account.name,
        key_bundle: account.key_bundle,
    }))
}
