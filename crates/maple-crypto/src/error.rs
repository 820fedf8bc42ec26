//! Error types for the maple-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Argon2id key derivation failed
    #[error("key derivation failed: {0}")]
    KdfFailure(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD decryption failed authentication
    #[error("ciphertext authentication failed")]
    AeadAuthFailure,

    /// A sealed box could not be opened with the provided keypair
    #[error("sealed box could not be opened")]
    SealOpenFailure,

    /// Key material has the wrong length
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    /// Nonce has the wrong length
    #[error("invalid nonce: expected {expected} bytes, got {actual}")]
    InvalidNonce { expected: usize, actual: usize },

    /// The master envelope did not open under the password-derived key
    #[error("wrong password")]
    WrongPassword,

    /// No membership envelope exists for this account
    #[error("no membership envelope for this account")]
    NotAMember,

    /// A wrapped-key envelope violates its size or nonce invariants
    #[error("corrupt key envelope: {0}")]
    CorruptEnvelope(String),

    /// A requested key version is not present in the envelope history
    #[error("no envelope for key version {0}")]
    UnknownKeyVersion(u32),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Mnemonic derivation error
    #[error("mnemonic derivation failed: {0}")]
    Mnemonic(String),
}
