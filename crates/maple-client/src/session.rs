//! The on-disk keystore and the unlocked session
//!
//! The keystore holds the account's key bundle (all ciphertext) plus the
//! current token pair. Tokens arrive sealed to the account public key, so
//! saving usable tokens requires the password once; after that the agent
//! runs from the keystore until the refresh token expires.

use crate::{ClientError, Result};
use chrono::{DateTime, Utc};
use maple_core::api::{TokenGrant, VerifyOttResponse};
use maple_core::Oid;
use maple_crypto::{
    bundle::{UnlockedKeys, UserKeyBundle},
    encoding, sealed,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the keystore file holds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedSession {
    pub account_id: Oid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub key_bundle: UserKeyBundle,
    /// Unsealed opaque tokens; the service cannot read them either way
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Loads and saves the keystore file
pub struct Keystore {
    path: PathBuf,
}

impl Keystore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a session has been saved
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the saved session
    pub fn load(&self) -> Result<SavedSession> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            ClientError::NotLoggedIn(format!("no session at {}: {e}", self.path.display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist a session, creating the data directory if needed
    pub fn save(&self, session: &SavedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Remove the saved session
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// An unlocked session: saved state plus live key material
pub struct Session {
    pub saved: SavedSession,
    keys: UnlockedKeys,
}

impl Session {
    /// Unlock a saved session with the password
    pub fn unlock(saved: SavedSession, password: &str) -> Result<Self> {
        let keys = saved.key_bundle.unlock(password)?;
        Ok(Self { saved, keys })
    }

    /// The live keys
    pub fn keys(&self) -> &UnlockedKeys {
        &self.keys
    }

    /// Whether the access token needs a refresh
    pub fn access_expired(&self) -> bool {
        self.saved.access_expires_at < Utc::now()
    }

    /// Open a sealed token grant and fold it into the saved state
    pub fn apply_sealed_grant(&mut self, grant: &TokenGrant) -> Result<()> {
        self.saved.access_token = self.unseal_token(&grant.encrypted_access_token)?;
        self.saved.refresh_token = self.unseal_token(&grant.encrypted_refresh_token)?;
        self.saved.access_expires_at = grant.access_expires_at;
        self.saved.refresh_expires_at = grant.refresh_expires_at;
        Ok(())
    }

    fn unseal_token(&self, sealed_b64: &str) -> Result<String> {
        let sealed_bytes = encoding::decode(sealed_b64).map_err(maple_crypto::CryptoError::from)?;
        let opened = sealed::seal_open(self.keys.keypair(), &sealed_bytes)?;
        String::from_utf8(opened)
            .map_err(|_| ClientError::LocalState("token is not valid UTF-8".to_string()))
    }
}

/// Build a saved session from a verified login, unsealing the tokens with
/// the password
pub fn session_from_login(login: VerifyOttResponse, password: &str) -> Result<SavedSession> {
    let keys = login.key_bundle.unlock(password)?;

    let unseal = |sealed_b64: &str| -> Result<String> {
        let sealed_bytes = encoding::decode(sealed_b64).map_err(maple_crypto::CryptoError::from)?;
        let opened = sealed::seal_open(keys.keypair(), &sealed_bytes)?;
        String::from_utf8(opened)
            .map_err(|_| ClientError::LocalState("token is not valid UTF-8".to_string()))
    };

    Ok(SavedSession {
        account_id: login.account_id,
        email: login.email,
        name: login.name,
        access_token: unseal(&login.tokens.encrypted_access_token)?,
        refresh_token: unseal(&login.tokens.encrypted_refresh_token)?,
        access_expires_at: login.tokens.access_expires_at,
        refresh_expires_at: login.tokens.refresh_expires_at,
        key_bundle: login.key_bundle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved() -> SavedSession {
        let (bundle, _) = UserKeyBundle::generate("pw").unwrap();
        SavedSession {
            account_id: Oid::new(),
            email: "a@example.com".to_string(),
            name: None,
            key_bundle: bundle,
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            access_expires_at: Utc::now() + chrono::Duration::minutes(30),
            refresh_expires_at: Utc::now() + chrono::Duration::days(14),
        }
    }

    #[test]
    fn test_keystore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Keystore::new(dir.path().join("session.json"));
        assert!(!keystore.exists());

        let session = saved();
        keystore.save(&session).unwrap();
        let loaded = keystore.load().unwrap();
        assert_eq!(loaded.account_id, session.account_id);
        assert_eq!(loaded.access_token, "access");

        keystore.clear().unwrap();
        assert!(!keystore.exists());
    }

    #[test]
    fn test_missing_keystore_is_not_logged_in() {
        let keystore = Keystore::new("/nonexistent/dir/session.json");
        assert!(matches!(keystore.load(), Err(ClientError::NotLoggedIn(_))));
    }

    #[test]
    fn test_unlock_wrong_password() {
        let result = Session::unlock(saved(), "wrong");
        assert!(matches!(
            result,
            Err(ClientError::Crypto(maple_crypto::CryptoError::WrongPassword))
        ));
    }

    #[test]
    fn test_sealed_grant_roundtrip() {
        let session_data = saved();
        let mut session = Session::unlock(session_data, "pw").unwrap();

        // Seal a pair to the account key, as the service would.
        let pk = &session.saved.key_bundle.public_key;
        let grant = TokenGrant {
            encrypted_access_token: encoding::encode(&sealed::seal(pk, b"new-access").unwrap()),
            encrypted_refresh_token: encoding::encode(&sealed::seal(pk, b"new-refresh").unwrap()),
            access_expires_at: Utc::now() + chrono::Duration::minutes(30),
            refresh_expires_at: Utc::now() + chrono::Duration::days(14),
        };

        session.apply_sealed_grant(&grant).unwrap();
        assert_eq!(session.saved.access_token, "new-access");
        assert_eq!(session.saved.refresh_token, "new-refresh");
    }

    #[test]
    fn test_access_expiry_check() {
        let mut session_data = saved();
        session_data.access_expires_at = Utc::now() - chrono::Duration::minutes(1);
        let session = Session::unlock(session_data, "pw").unwrap();
        assert!(session.access_expired());
    }
}
