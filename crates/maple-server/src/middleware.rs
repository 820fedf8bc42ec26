//! HTTP middleware: request ids, logging, rate limiting, the country
//! blocker, and bearer-token authentication

use crate::auth::{extract_bearer_token, Session, TokenKind};
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use governor::{state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter keyed by account (or "anonymous" pre-auth)
pub type KeyedRateLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

/// Create the keyed rate limiter
pub fn create_rate_limiter(requests_per_second: u32) -> Arc<KeyedRateLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).unwrap());
    Arc::new(RateLimiter::keyed(quota))
}

/// Bearer-token authentication; inserts a [`Session`] extension
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthenticated("authentication required".to_string()))?;
    let token = extract_bearer_token(header)
        .ok_or_else(|| ApiError::Unauthenticated("malformed Authorization header".to_string()))?;

    let session = state.tokens.validate(token, TokenKind::Access)?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Per-account rate limiting; runs after auth so the key is the account
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .extensions()
        .get::<Session>()
        .map(|s| s.account_id.to_hex())
        .unwrap_or_else(|| "anonymous".to_string());

    if limiter.check_key(&key).is_err() {
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}

/// Refuse requests tagged with a banned country code
///
/// Geo-IP resolution happens upstream; this only reads the header it
/// leaves behind.
pub async fn country_block_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(code) = request
        .headers()
        .get("X-Country-Code")
        .and_then(|h| h.to_str().ok())
    {
        if state.is_country_blocked(code) {
            return Err(ApiError::RegionBlocked);
        }
    }
    Ok(next.run(request).await)
}

/// Request ID extension
#[derive(Clone)]
pub struct RequestId(pub String);

/// Tag every request/response with an id
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Structured request logging
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "request completed"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_first_request() {
        let limiter = create_rate_limiter(100);
        assert!(limiter.check_key(&"account1".to_string()).is_ok());
    }

    #[test]
    fn test_rate_limiter_trips() {
        let limiter = create_rate_limiter(1);
        let key = "hot".to_string();
        assert!(limiter.check_key(&key).is_ok());
        // The burst budget is one request per second; the second call in
        // the same instant must trip.
        assert!(limiter.check_key(&key).is_err());
    }
}
