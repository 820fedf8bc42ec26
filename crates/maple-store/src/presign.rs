//! Presigned-URL signing
//!
//! URLs are `{base_url}/storage/{path}?expires={unix}&sig={hex}` where the
//! signature is a keyed SHA-256 digest over (method, path, expiry). The
//! byte surface that serves these URLs re-checks the signature and expiry,
//! so a URL is exactly as capable as the grant that minted it.

use crate::{Result, StoreError, MAX_URL_TTL};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// HTTP method a presigned URL is valid for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedMethod {
    Get,
    Put,
}

impl SignedMethod {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

/// Mints and verifies URL signatures with a shared secret
#[derive(Clone)]
pub struct UrlSigner {
    secret: [u8; 32],
    base_url: String,
}

impl UrlSigner {
    /// Create a signer for the given public base URL
    pub fn new(base_url: impl Into<String>, secret: [u8; 32]) -> Self {
        Self {
            secret,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a signer with a random secret (single-process deployments)
    pub fn with_random_secret(base_url: impl Into<String>) -> Self {
        let mut secret = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut secret);
        Self::new(base_url, secret)
    }

    fn digest(&self, method: SignedMethod, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(expires.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Mint a signed URL for the path
    pub fn sign(
        &self,
        method: SignedMethod,
        path: &str,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>)> {
        if ttl > MAX_URL_TTL {
            return Err(StoreError::TtlTooLong {
                requested_secs: ttl.as_secs(),
                max_secs: MAX_URL_TTL.as_secs(),
            });
        }
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1));
        let expires = expires_at.timestamp();
        let sig = self.digest(method, path, expires);
        let url = format!(
            "{}/storage/{}?expires={}&sig={}",
            self.base_url, path, expires, sig
        );
        Ok((url, expires_at))
    }

    /// Verify the signature and expiry carried in query parameters
    pub fn verify(
        &self,
        method: SignedMethod,
        path: &str,
        expires: i64,
        sig: &str,
    ) -> Result<()> {
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| StoreError::InvalidSignature("bad expiry timestamp".to_string()))?;
        if expires_at < Utc::now() {
            return Err(StoreError::InvalidSignature("url expired".to_string()));
        }
        let expected = self.digest(method, path, expires);
        if expected != sig {
            return Err(StoreError::InvalidSignature("signature mismatch".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("http://localhost:8000", [7u8; 32])
    }

    #[test]
    fn test_sign_and_verify() {
        let s = signer();
        let (url, expires_at) = s
            .sign(SignedMethod::Put, "owner/file", Duration::from_secs(60))
            .unwrap();

        assert!(url.starts_with("http://localhost:8000/storage/owner/file?expires="));
        assert!(expires_at > Utc::now());

        let expires: i64 = url.split("expires=").nth(1).unwrap().split('&').next().unwrap().parse().unwrap();
        let sig = url.split("sig=").nth(1).unwrap();
        s.verify(SignedMethod::Put, "owner/file", expires, sig).unwrap();
    }

    #[test]
    fn test_wrong_method_rejected() {
        let s = signer();
        let (url, _) = s
            .sign(SignedMethod::Put, "owner/file", Duration::from_secs(60))
            .unwrap();
        let expires: i64 = url.split("expires=").nth(1).unwrap().split('&').next().unwrap().parse().unwrap();
        let sig = url.split("sig=").nth(1).unwrap();

        assert!(s.verify(SignedMethod::Get, "owner/file", expires, sig).is_err());
    }

    #[test]
    fn test_wrong_path_rejected() {
        let s = signer();
        let (url, _) = s
            .sign(SignedMethod::Get, "owner/file", Duration::from_secs(60))
            .unwrap();
        let expires: i64 = url.split("expires=").nth(1).unwrap().split('&').next().unwrap().parse().unwrap();
        let sig = url.split("sig=").nth(1).unwrap();

        assert!(s.verify(SignedMethod::Get, "owner/other", expires, sig).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let s = signer();
        let expires = (Utc::now() - chrono::Duration::minutes(5)).timestamp();
        let sig = s.digest(SignedMethod::Get, "owner/file", expires);

        let result = s.verify(SignedMethod::Get, "owner/file", expires, &sig);
        assert!(matches!(result, Err(StoreError::InvalidSignature(_))));
    }

    #[test]
    fn test_ttl_ceiling() {
        let s = signer();
        let result = s.sign(
            SignedMethod::Get,
            "owner/file",
            Duration::from_secs(25 * 60 * 60),
        );
        assert!(matches!(result, Err(StoreError::TtlTooLong { .. })));
    }

    #[test]
    fn test_different_secrets_disagree() {
        let a = UrlSigner::new("http://localhost", [1u8; 32]);
        let b = UrlSigner::new("http://localhost", [2u8; 32]);
        let expires = (Utc::now() + chrono::Duration::minutes(5)).timestamp();
        let sig = a.digest(SignedMethod::Get, "p", expires);

        assert!(b.verify(SignedMethod::Get, "p", expires, &sig).is_err());
    }
}
