//! Wrapped-key envelopes with rotation history
//!
//! A [`WrappedKey`] is one raw key AEAD-encrypted under a wrapping key,
//! carrying `key_version` and the envelopes of prior versions so items
//! encrypted before a rotation stay decryptable.

use crate::{
    aead::{self, EncryptedBlob},
    encoding,
    keys::SymmetricKey,
    CryptoError, Result, NONCE_SIZE, TAG_SIZE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retired envelope kept for decrypting historical items
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreviousKey {
    #[serde(with = "encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "encoding::base64_bytes")]
    pub nonce: Vec<u8>,
    pub key_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotated_at: Option<DateTime<Utc>>,
}

/// A raw key wrapped under a symmetric wrapping key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrappedKey {
    #[serde(with = "encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "encoding::base64_bytes")]
    pub nonce: Vec<u8>,
    pub key_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_keys: Vec<PreviousKey>,
}

impl WrappedKey {
    /// Wrap a symmetric key
    pub fn wrap(key: &SymmetricKey, wrapping_key: &SymmetricKey, key_version: u32) -> Result<Self> {
        Self::wrap_bytes(key.as_bytes(), wrapping_key, key_version)
    }

    /// Wrap arbitrary key bytes (used for the private key)
    pub fn wrap_bytes(raw: &[u8], wrapping_key: &SymmetricKey, key_version: u32) -> Result<Self> {
        let blob = aead::encrypt(wrapping_key, raw)?;
        Ok(Self {
            ciphertext: blob.ciphertext,
            nonce: blob.nonce,
            key_version,
            rotated_at: None,
            previous_keys: Vec::new(),
        })
    }

    /// Unwrap to a 32-byte symmetric key
    pub fn unwrap_key(&self, wrapping_key: &SymmetricKey) -> Result<SymmetricKey> {
        SymmetricKey::from_bytes(&self.unwrap_bytes(wrapping_key)?)
    }

    /// Unwrap to raw bytes
    pub fn unwrap_bytes(&self, wrapping_key: &SymmetricKey) -> Result<Vec<u8>> {
        self.validate()?;
        aead::decrypt(
            wrapping_key,
            &EncryptedBlob {
                ciphertext: self.ciphertext.clone(),
                nonce: self.nonce.clone(),
            },
        )
    }

    /// Unwrap a specific historical version
    pub fn unwrap_key_version(&self, wrapping_key: &SymmetricKey, version: u32) -> Result<SymmetricKey> {
        if version == self.key_version {
            return self.unwrap_key(wrapping_key);
        }
        let prev = self
            .previous_keys
            .iter()
            .find(|p| p.key_version == version)
            .ok_or(CryptoError::UnknownKeyVersion(version))?;
        let raw = aead::decrypt(
            wrapping_key,
            &EncryptedBlob {
                ciphertext: prev.ciphertext.clone(),
                nonce: prev.nonce.clone(),
            },
        )?;
        SymmetricKey::from_bytes(&raw)
    }

    /// Rotate to a new raw key
    ///
    /// The current envelope is retired into `previous_keys` and the new key
    /// is wrapped at `key_version + 1`.
    pub fn rotate(&mut self, new_key: &SymmetricKey, wrapping_key: &SymmetricKey) -> Result<()> {
        let blob = aead::encrypt(wrapping_key, new_key.as_bytes())?;
        self.previous_keys.push(PreviousKey {
            ciphertext: std::mem::take(&mut self.ciphertext),
            nonce: std::mem::take(&mut self.nonce),
            key_version: self.key_version,
            rotated_at: self.rotated_at,
        });
        self.ciphertext = blob.ciphertext;
        self.nonce = blob.nonce;
        self.key_version += 1;
        self.rotated_at = Some(Utc::now());
        Ok(())
    }

    /// Check the envelope's structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.nonce.len() != NONCE_SIZE {
            return Err(CryptoError::CorruptEnvelope(format!(
                "nonce is {} bytes, expected {}",
                self.nonce.len(),
                NONCE_SIZE
            )));
        }
        if self.ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::CorruptEnvelope(format!(
                "ciphertext is {} bytes, shorter than the tag",
                self.ciphertext.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let wrapping = SymmetricKey::generate();
        let inner = SymmetricKey::generate();

        let wrapped = WrappedKey::wrap(&inner, &wrapping, 1).unwrap();
        let unwrapped = wrapped.unwrap_key(&wrapping).unwrap();

        assert_eq!(inner.as_bytes(), unwrapped.as_bytes());
        assert_eq!(wrapped.key_version, 1);
    }

    #[test]
    fn test_wrong_wrapping_key_fails() {
        let inner = SymmetricKey::generate();
        let wrapped = WrappedKey::wrap(&inner, &SymmetricKey::generate(), 1).unwrap();

        let result = wrapped.unwrap_key(&SymmetricKey::generate());
        assert!(matches!(result, Err(CryptoError::AeadAuthFailure)));
    }

    #[test]
    fn test_rotation_keeps_history() {
        let wrapping = SymmetricKey::generate();
        let v1_key = SymmetricKey::generate();
        let v2_key = SymmetricKey::generate();

        let mut wrapped = WrappedKey::wrap(&v1_key, &wrapping, 1).unwrap();
        wrapped.rotate(&v2_key, &wrapping).unwrap();

        assert_eq!(wrapped.key_version, 2);
        assert!(wrapped.rotated_at.is_some());
        assert_eq!(wrapped.previous_keys.len(), 1);

        let current = wrapped.unwrap_key(&wrapping).unwrap();
        assert_eq!(current.as_bytes(), v2_key.as_bytes());

        let historical = wrapped.unwrap_key_version(&wrapping, 1).unwrap();
        assert_eq!(historical.as_bytes(), v1_key.as_bytes());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let wrapping = SymmetricKey::generate();
        let wrapped = WrappedKey::wrap(&SymmetricKey::generate(), &wrapping, 3).unwrap();

        let result = wrapped.unwrap_key_version(&wrapping, 7);
        assert!(matches!(result, Err(CryptoError::UnknownKeyVersion(7))));
    }

    #[test]
    fn test_corrupt_nonce_rejected() {
        let wrapping = SymmetricKey::generate();
        let mut wrapped = WrappedKey::wrap(&SymmetricKey::generate(), &wrapping, 1).unwrap();
        wrapped.nonce.truncate(6);

        assert!(matches!(
            wrapped.unwrap_key(&wrapping),
            Err(CryptoError::CorruptEnvelope(_))
        ));
    }

    #[test]
    fn test_serde_omits_empty_history() {
        let wrapping = SymmetricKey::generate();
        let wrapped = WrappedKey::wrap(&SymmetricKey::generate(), &wrapping, 1).unwrap();
        let json = serde_json::to_value(&wrapped).unwrap();
        assert!(json.get("previous_keys").is_none());
        assert!(json.get("rotated_at").is_none());
        assert!(json["ciphertext"].is_string());
    }
}
