//! Password key derivation
//!
//! Argon2id turns the account password plus a 16-byte salt into the
//! key-encryption key at the root of the hierarchy. Parameters are
//! persisted with the account so a deployment can raise costs later;
//! [`KdfParams::needs_upgrade`] flags bundles still on older settings.

use crate::{keys::SymmetricKey, CryptoError, Result, KEY_SIZE, SALT_SIZE};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Default Argon2id memory cost in KiB (64 MiB)
pub const DEFAULT_MEMORY_KIB: u32 = 65_536;

/// Default Argon2id iteration count
pub const DEFAULT_OPS: u32 = 4;

/// Default Argon2id lane count
pub const DEFAULT_PARALLELISM: u32 = 1;

/// KDF parameters persisted with the account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Algorithm identifier, always `"argon2id"`
    pub algorithm: String,
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iteration count
    pub ops: u32,
    /// Lane count
    pub parallelism: u32,
    /// Derived key length in bytes
    pub out_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: "argon2id".to_string(),
            memory_kib: DEFAULT_MEMORY_KIB,
            ops: DEFAULT_OPS,
            parallelism: DEFAULT_PARALLELISM,
            out_len: KEY_SIZE,
        }
    }
}

impl KdfParams {
    /// Whether a bundle carrying these parameters should be re-derived at
    /// the next password entry
    pub fn needs_upgrade(&self) -> bool {
        let current = Self::default();
        self.algorithm != current.algorithm
            || self.memory_kib < current.memory_kib
            || self.ops < current.ops
            || self.out_len != current.out_len
    }
}

/// Generate a fresh random password salt
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::RngCore::fill_bytes(&mut OsRng, &mut salt);
    salt
}

/// Derive the key-encryption key from a password and salt
///
/// Argon2 is CPU-bound; async callers run this on a blocking worker.
pub fn derive_kek(password: &str, salt: &[u8], params: &KdfParams) -> Result<SymmetricKey> {
    if params.algorithm != "argon2id" {
        return Err(CryptoError::KdfFailure(format!(
            "unsupported KDF algorithm {:?}",
            params.algorithm
        )));
    }
    if salt.len() != SALT_SIZE {
        return Err(CryptoError::KdfFailure(format!(
            "salt must be {} bytes, got {}",
            SALT_SIZE,
            salt.len()
        )));
    }

    let argon_params = Params::new(params.memory_kib, params.ops, params.parallelism, Some(params.out_len))
        .map_err(|e| CryptoError::KdfFailure(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = vec![0u8; params.out_len];
    argon
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| CryptoError::KdfFailure(e.to_string()))?;

    let key = SymmetricKey::from_bytes(&out);
    out.zeroize();
    key
}
