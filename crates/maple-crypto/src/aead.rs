//! Symmetric authenticated encryption
//!
//! ChaCha20-Poly1305 with fresh 12-byte random nonces. Every ciphertext is
//! carried as an [`EncryptedBlob`] (`{ciphertext, nonce}`) or, where a wire
//! field is a single string, as `base64(nonce ‖ ciphertext)`.

use crate::{encoding, keys::SymmetricKey, CryptoError, Result, NONCE_SIZE, TAG_SIZE};
use chacha20poly1305::{aead::Aead as AeadTrait, ChaCha20Poly1305, KeyInit};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce {
                expected: NONCE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

/// An AEAD ciphertext together with the nonce that produced it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Ciphertext including the 16-byte authentication tag
    #[serde(with = "encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// The 12-byte nonce
    #[serde(with = "encoding::base64_bytes")]
    pub nonce: Vec<u8>,
}

impl EncryptedBlob {
    /// Encode as the compact single-string wire form `base64(nonce ‖ ciphertext)`
    pub fn encode_compact(&self) -> String {
        let mut combined = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        combined.extend_from_slice(&self.nonce);
        combined.extend_from_slice(&self.ciphertext);
        encoding::encode(&combined)
    }

    /// Decode the compact single-string wire form
    pub fn decode_compact(s: &str) -> Result<Self> {
        let combined = encoding::decode(s)?;
        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::CorruptEnvelope(format!(
                "compact blob too short: {} bytes",
                combined.len()
            )));
        }
        Ok(Self {
            nonce: combined[..NONCE_SIZE].to_vec(),
            ciphertext: combined[NONCE_SIZE..].to_vec(),
        })
    }
}

/// Encrypt plaintext under a symmetric key with a fresh random nonce
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<EncryptedBlob> {
    let nonce = Nonce::generate();
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(chacha20poly1305::Nonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(EncryptedBlob {
        ciphertext,
        nonce: nonce.as_bytes().to_vec(),
    })
}

/// Decrypt an [`EncryptedBlob`]
pub fn decrypt(key: &SymmetricKey, blob: &EncryptedBlob) -> Result<Vec<u8>> {
    let nonce = Nonce::from_bytes(&blob.nonce)?;
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    cipher
        .decrypt(
            chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
            blob.ciphertext.as_slice(),
        )
        .map_err(|_| CryptoError::AeadAuthFailure)
}

/// Encrypt a string field into the compact wire form
pub fn encrypt_string_field(key: &SymmetricKey, plaintext: &[u8]) -> Result<String> {
    Ok(encrypt(key, plaintext)?.encode_compact())
}

/// Decrypt a compact wire-form string field
pub fn decrypt_string_field(key: &SymmetricKey, field: &str) -> Result<Vec<u8>> {
    let blob = EncryptedBlob::decode_compact(field)?;
    decrypt(key, &blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = SymmetricKey::generate();
        let plaintext = b"Hello, World!";

        let blob = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &blob).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SymmetricKey::generate();
        let key2 = SymmetricKey::generate();

        let blob = encrypt(&key1, b"secret").unwrap();
        let result = decrypt(&key2, &blob);

        assert!(matches!(result, Err(CryptoError::AeadAuthFailure)));
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let key = SymmetricKey::generate();
        let mut blob = encrypt(&key, b"authenticated message").unwrap();
        blob.ciphertext[0] ^= 0xFF;

        assert!(matches!(decrypt(&key, &blob), Err(CryptoError::AeadAuthFailure)));
    }

    #[test]
    fn test_tampered_tag_detected() {
        let key = SymmetricKey::generate();
        let mut blob = encrypt(&key, b"tagged message").unwrap();
        let last = blob.ciphertext.len() - 1;
        blob.ciphertext[last] ^= 0x01;

        assert!(decrypt(&key, &blob).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = SymmetricKey::generate();
        let mut blob = encrypt(&key, b"message to truncate").unwrap();
        blob.ciphertext.truncate(blob.ciphertext.len() / 2);

        assert!(decrypt(&key, &blob).is_err());
    }

    #[test]
    fn test_ciphertext_randomness() {
        let key = SymmetricKey::generate();
        let b1 = encrypt(&key, b"same message").unwrap();
        let b2 = encrypt(&key, b"same message").unwrap();

        assert_ne!(b1.ciphertext, b2.ciphertext);
        assert_ne!(b1.nonce, b2.nonce);
    }

    #[test]
    fn test_ciphertext_expansion() {
        let key = SymmetricKey::generate();
        let blob = encrypt(&key, b"expansion check").unwrap();
        assert_eq!(blob.ciphertext.len(), b"expansion check".len() + TAG_SIZE);
        assert_eq!(blob.nonce.len(), NONCE_SIZE);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SymmetricKey::generate();
        let blob = encrypt(&key, b"").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_compact_roundtrip() {
        let key = SymmetricKey::generate();
        let field = encrypt_string_field(&key, b"folder name").unwrap();
        let decrypted = decrypt_string_field(&key, &field).unwrap();
        assert_eq!(decrypted, b"folder name");
    }

    #[test]
    fn test_compact_too_short_rejected() {
        let result = EncryptedBlob::decode_compact(&crate::encoding::encode(&[0u8; 10]));
        assert!(matches!(result, Err(CryptoError::CorruptEnvelope(_))));
    }

    #[test]
    fn test_blob_serde_uses_base64_strings() {
        let key = SymmetricKey::generate();
        let blob = encrypt(&key, b"wire form").unwrap();
        let json = serde_json::to_value(&blob).unwrap();
        assert!(json["ciphertext"].is_string());
        assert!(json["nonce"].is_string());
        let back: EncryptedBlob = serde_json::from_value(json).unwrap();
        assert_eq!(blob, back);
    }
}
