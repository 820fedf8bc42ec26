//! Sessions and encrypted tokens
//!
//! Tokens are opaque to the client: AEAD-encrypted claims under a
//! server-side token key. At login both tokens are additionally sealed to
//! the account's public key, so using them requires the private key - and
//! therefore the password. The refresh endpoint accepts the unsealed
//! refresh token and issues a fresh sealed pair.

use crate::ApiError;
use chrono::{DateTime, Duration, Utc};
use maple_core::{api::TokenGrant, types::Account, Oid};
use maple_crypto::{aead, keys::SymmetricKey, sealed, EncryptedBlob};
use rand::{rngs::OsRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

/// The authenticated caller, stored in request extensions
#[derive(Clone, Debug)]
pub struct Session {
    pub account_id: Oid,
    pub expires_at: DateTime<Utc>,
}

/// What a token authorizes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Serialize, Deserialize)]
struct TokenClaims {
    sub: Oid,
    kind: TokenKind,
    exp: i64,
    jti: String,
}

/// Issues and validates encrypted tokens
#[derive(Clone)]
pub struct TokenService {
    key: SymmetricKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(key: SymmetricKey, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            key,
            access_ttl,
            refresh_ttl,
        }
    }

    fn issue(&self, account_id: Oid, kind: TokenKind, ttl: Duration) -> Result<(String, DateTime<Utc>), ApiError> {
        let expires_at = Utc::now() + ttl;
        let mut jti = [0u8; 8];
        OsRng.fill_bytes(&mut jti);
        let claims = TokenClaims {
            sub: account_id,
            kind,
            exp: expires_at.timestamp(),
            jti: hex::encode(jti),
        };
        let plaintext = serde_json::to_vec(&claims)
            .map_err(|e| ApiError::Core(maple_core::CoreError::Internal(e.to_string())))?;
        let blob = aead::encrypt(&self.key, &plaintext)?;
        Ok((blob.encode_compact(), expires_at))
    }

    /// Issue a sealed access/refresh pair for an account
    pub fn issue_sealed_grant(&self, account: &Account) -> Result<TokenGrant, ApiError> {
        let (access, access_expires_at) = self.issue(account.id, TokenKind::Access, self.access_ttl)?;
        let (refresh, refresh_expires_at) =
            self.issue(account.id, TokenKind::Refresh, self.refresh_ttl)?;

        let pk = &account.key_bundle.public_key;
        let sealed_access = sealed::seal(pk, access.as_bytes())?;
        let sealed_refresh = sealed::seal(pk, refresh.as_bytes())?;

        Ok(TokenGrant {
            encrypted_access_token: maple_crypto::encoding::encode(&sealed_access),
            encrypted_refresh_token: maple_crypto::encoding::encode(&sealed_refresh),
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate a bearer token of the expected kind
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Session, ApiError> {
        let unauthenticated = |_| ApiError::Unauthenticated("invalid or expired token".to_string());

        let blob = EncryptedBlob::decode_compact(token).map_err(unauthenticated)?;
        let plaintext = aead::decrypt(&self.key, &blob).map_err(unauthenticated)?;
        let claims: TokenClaims = serde_json::from_slice(&plaintext)
            .map_err(|_| ApiError::Unauthenticated("invalid or expired token".to_string()))?;

        if claims.kind != expected {
            return Err(ApiError::Unauthenticated("wrong token kind".to_string()));
        }
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| ApiError::Unauthenticated("invalid or expired token".to_string()))?;
        if expires_at < Utc::now() {
            return Err(ApiError::Unauthenticated("token has expired".to_string()));
        }
        Ok(Session {
            account_id: claims.sub,
            expires_at,
        })
    }
}

/// Extract the bearer token from an Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

/// A pending login one-time token
#[derive(Clone, Debug)]
pub struct OttEntry {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl OttEntry {
    /// Draw a fresh 6-digit code
    pub fn generate(ttl: Duration) -> Self {
        let code = format!("{:06}", OsRng.gen_range(0..1_000_000u32));
        Self {
            code,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
