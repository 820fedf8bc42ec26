//! Anonymous sealed boxes
//!
//! Curve25519 + XSalsa20-Poly1305 with an ephemeral sender keypair, wire
//! form `ephemeral_pk(32) ‖ ciphertext ‖ tag(16)`. Only the recipient can
//! open the box; no sender identity is carried, so recipients rely on
//! out-of-band trust via the verification mnemonic.

use crate::{
    keys::{KeyPair, PublicKey},
    CryptoError, Result, SEALED_OVERHEAD,
};
use rand::rngs::OsRng;

/// Seal plaintext for a recipient
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let pk = crypto_box::PublicKey::from(*recipient.as_bytes());
    pk.seal(&mut OsRng, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("sealing failed: {e}")))
}

/// Open a sealed box with the recipient's keypair
pub fn seal_open(keypair: &KeyPair, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEALED_OVERHEAD {
        return Err(CryptoError::CorruptEnvelope(format!(
            "sealed box too short: {} bytes",
            sealed.len()
        )));
    }
    let sk = crypto_box::SecretKey::from(*keypair.private_key().as_bytes());
    sk.unseal(sealed).map_err(|_| CryptoError::SealOpenFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_roundtrip() {
        let recipient = KeyPair::generate();
        let sealed = seal(recipient.public_key(), b"collection key bytes").unwrap();
        let opened = seal_open(&recipient, &sealed).unwrap();
        assert_eq!(opened, b"collection key bytes");
    }

    #[test]
    fn test_overhead() {
        let recipient = KeyPair::generate();
        let sealed = seal(recipient.public_key(), b"32 bytes of key material here!!!").unwrap();
        assert_eq!(sealed.len(), 32 + SEALED_OVERHEAD);
    }

    #[test]
    fn test_only_recipient_can_open() {
        let recipient = KeyPair::generate();
        let other = KeyPair::generate();

        let sealed = seal(recipient.public_key(), b"secret").unwrap();
        assert!(matches!(
            seal_open(&other, &sealed),
            Err(CryptoError::SealOpenFailure)
        ));
    }

    #[test]
    fn test_no_sender_identity_needed() {
        // The recipient opens with only their own keypair; two different
        // senders produce boxes that are indistinguishable in structure.
        let recipient = KeyPair::generate();
        let s1 = seal(recipient.public_key(), b"from A").unwrap();
        let s2 = seal(recipient.public_key(), b"from B").unwrap();

        assert_eq!(seal_open(&recipient, &s1).unwrap(), b"from A");
        assert_eq!(seal_open(&recipient, &s2).unwrap(), b"from B");
        assert_eq!(s1.len(), s2.len());
    }

    #[test]
    fn test_tampering_detected() {
        let recipient = KeyPair::generate();
        let mut sealed = seal(recipient.public_key(), b"intact").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(seal_open(&recipient, &sealed).is_err());
    }

    #[test]
    fn test_short_box_rejected() {
        let recipient = KeyPair::generate();
        assert!(matches!(
            seal_open(&recipient, &[0u8; 20]),
            Err(CryptoError::CorruptEnvelope(_))
        ));
    }

    #[test]
    fn test_seal_randomized() {
        let recipient = KeyPair::generate();
        let s1 = seal(recipient.public_key(), b"same plaintext").unwrap();
        let s2 = seal(recipient.public_key(), b"same plaintext").unwrap();
        assert_ne!(s1, s2);
    }
}
