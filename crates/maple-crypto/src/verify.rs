//! Human-verifiable account identity
//!
//! The verification id is a deterministic BIP-39 mnemonic derived from
//! `SHA-256(public_key)`. Two people comparing mnemonics out of band get
//! the sender authentication that sealed boxes intentionally omit.

use crate::{keys::PublicKey, CryptoError, Result};
use sha2::{Digest, Sha256};

/// Derive the verification mnemonic for a public key (24 English words)
pub fn verification_id(public_key: &PublicKey) -> Result<String> {
    let digest = Sha256::digest(public_key.as_bytes());
    let mnemonic =
        bip39::Mnemonic::from_entropy(&digest).map_err(|e| CryptoError::Mnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Check a claimed verification id against a public key
pub fn verification_id_matches(public_key: &PublicKey, claimed: &str) -> bool {
    verification_id(public_key)
        .map(|id| id == claimed.trim())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    #[test]
    fn test_deterministic() {
        let kp = KeyPair::generate();
        let id1 = verification_id(kp.public_key()).unwrap();
        let id2 = verification_id(kp.public_key()).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_twenty_four_words() {
        let kp = KeyPair::generate();
        let id = verification_id(kp.public_key()).unwrap();
        assert_eq!(id.split_whitespace().count(), 24);
    }

    #[test]
    fn test_distinct_keys_distinct_ids() {
        let id1 = verification_id(KeyPair::generate().public_key()).unwrap();
        let id2 = verification_id(KeyPair::generate().public_key()).unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_matches() {
        let kp = KeyPair::generate();
        let id = verification_id(kp.public_key()).unwrap();

        assert!(verification_id_matches(kp.public_key(), &id));
        assert!(verification_id_matches(kp.public_key(), &format!("  {id} ")));
        assert!(!verification_id_matches(
            KeyPair::generate().public_key(),
            &id
        ));
    }
}
