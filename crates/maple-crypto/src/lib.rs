//! # Maple Crypto
//!
//! Cryptographic core for the MapleFile end-to-end encrypted sync system.
//!
//! All encryption happens on the client; the cloud only ever sees the
//! ciphertext shapes defined here. The crate implements:
//!
//! - **Argon2id KDF**: password → key-encryption key, with persisted
//!   parameters so deployments can raise costs later
//! - **ChaCha20-Poly1305 AEAD**: every symmetric ciphertext is
//!   `{ciphertext, nonce}`, or `base64(nonce ‖ ciphertext)` when a single
//!   string field is needed
//! - **Anonymous sealed boxes**: Curve25519 + XSalsa20-Poly1305 with an
//!   ephemeral sender key, for handing collection keys to other accounts
//! - **Key envelopes**: wrapped keys carrying a version and a rotation
//!   history
//! - **The user key bundle**: the password-rooted hierarchy of master,
//!   private, recovery, collection, and file keys
//!
//! ## Security model
//!
//! The server MUST never hold plaintext, plaintext keys, or the password.
//! Raw key material lives in zeroize-on-drop buffers and exists only while
//! an operation needs it. There is no recovery path that does not require
//! the recovery secret.
//!
//! ## Example
//!
//! ```rust,ignore
//! use maple_crypto::{UserKeyBundle, aead};
//!
//! let (bundle, recovery_secret) = UserKeyBundle::generate("correct horse")?;
//! let unlocked = bundle.unlock("correct horse")?;
//!
//! let blob = aead::encrypt(unlocked.master_key(), b"folder name")?;
//! let name = aead::decrypt(unlocked.master_key(), &blob)?;
//! ```

pub mod aead;
pub mod bundle;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod sealed;
pub mod verify;

pub use aead::{EncryptedBlob, Nonce};
pub use bundle::{open_collection_key_as_member, open_collection_key_as_owner, open_file_key, UnlockedKeys, UserKeyBundle};
pub use envelope::{PreviousKey, WrappedKey};
pub use error::{CryptoError, Result};
pub use kdf::KdfParams;
pub use keys::{KeyPair, PrivateKey, PublicKey, SymmetricKey};
pub use sealed::{seal, seal_open};
pub use verify::{verification_id, verification_id_matches};

/// Size of every symmetric key in bytes (master, KEK, recovery, collection, file)
pub const KEY_SIZE: usize = 32;

/// Size of an AEAD nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of the password salt in bytes
pub const SALT_SIZE: usize = 16;

/// Byte overhead of a sealed box (ephemeral public key 32 + Poly1305 tag 16)
pub const SEALED_OVERHEAD: usize = 48;

/// AEAD authentication tag size in bytes
pub const TAG_SIZE: usize = 16;
