//! The user key bundle
//!
//! Everything the cloud stores about an account's keys, and the client-side
//! operations that walk the hierarchy:
//!
//! ```text
//! password ──Argon2id──▶ KEK
//! KEK ──AEAD open──▶ master_key
//! master_key ──AEAD open──▶ private_key
//! master_key ──AEAD open──▶ recovery_key            (recovery flow only)
//! master_key ──AEAD open──▶ collection_key          (owner path)
//! private_key + public_key ──seal open──▶ collection_key   (member path)
//! collection_key ──AEAD open──▶ file_key
//! ```

use crate::{
    aead::{self, EncryptedBlob},
    encoding,
    envelope::WrappedKey,
    kdf::{self, KdfParams},
    keys::{KeyPair, PrivateKey, PublicKey, SymmetricKey},
    sealed, verify, CryptoError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often an account intends to rotate its keys
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum KeyRotationPolicy {
    /// Rotate only when the user asks
    Manual,
    /// Rotate after the given number of days
    Interval { days: u32 },
}

impl Default for KeyRotationPolicy {
    fn default() -> Self {
        Self::Manual
    }
}

/// An account's complete key material, as stored by the cloud
///
/// Every key in here is ciphertext; the cloud can persist and return this
/// structure but never open any part of it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserKeyBundle {
    /// Salt for the password KDF
    #[serde(with = "encoding::base64_bytes")]
    pub password_salt: Vec<u8>,
    /// KDF parameters the salt was used with
    pub kdf_params: KdfParams,
    /// Set when `kdf_params` lag the current defaults
    #[serde(default)]
    pub kdf_params_need_upgrade: bool,
    /// Master key wrapped under the password-derived KEK
    pub encrypted_master_key: WrappedKey,
    /// Curve25519 public key
    pub public_key: PublicKey,
    /// Private key wrapped under the master key
    pub encrypted_private_key: WrappedKey,
    /// Recovery key wrapped under the master key
    pub encrypted_recovery_key: WrappedKey,
    /// Master key wrapped under the recovery key (recovery flow)
    pub master_key_encrypted_with_recovery_key: WrappedKey,
    /// Deterministic BIP-39 mnemonic of `SHA-256(public_key)`
    pub verification_id: String,
    /// Version of the master envelope
    pub current_key_version: u32,
    /// When the master envelope last rotated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_key_rotation: Option<DateTime<Utc>>,
    /// Rotation intent
    #[serde(default)]
    pub key_rotation_policy: KeyRotationPolicy,
}

/// Raw keys held in memory while a session is unlocked
pub struct UnlockedKeys {
    master: SymmetricKey,
    keypair: KeyPair,
}

impl UnlockedKeys {
    /// The master key
    pub fn master_key(&self) -> &SymmetricKey {
        &self.master
    }

    /// The account keypair
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

impl std::fmt::Debug for UnlockedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UnlockedKeys([REDACTED])")
    }
}

impl UserKeyBundle {
    /// Generate a fresh bundle from a password
    ///
    /// Returns the bundle and the one-time recovery secret. The secret is
    /// shown to the user exactly once; losing both it and the password
    /// makes the account unrecoverable.
    pub fn generate(password: &str) -> Result<(Self, SymmetricKey)> {
        let password_salt = kdf::generate_salt();
        let kdf_params = KdfParams::default();
        let kek = kdf::derive_kek(password, &password_salt, &kdf_params)?;

        let master = SymmetricKey::generate();
        let recovery = SymmetricKey::generate();
        let keypair = KeyPair::generate();

        let encrypted_master_key = WrappedKey::wrap(&master, &kek, 1)?;
        let encrypted_private_key =
            WrappedKey::wrap_bytes(keypair.private_key().as_bytes(), &master, 1)?;
        let encrypted_recovery_key = WrappedKey::wrap(&recovery, &master, 1)?;
        let master_key_encrypted_with_recovery_key = WrappedKey::wrap(&master, &recovery, 1)?;
        let verification_id = verify::verification_id(keypair.public_key())?;

        let bundle = Self {
            password_salt,
            kdf_params,
            kdf_params_need_upgrade: false,
            encrypted_master_key,
            public_key: keypair.public_key().clone(),
            encrypted_private_key,
            encrypted_recovery_key,
            master_key_encrypted_with_recovery_key,
            verification_id,
            current_key_version: 1,
            last_key_rotation: None,
            key_rotation_policy: KeyRotationPolicy::default(),
        };
        Ok((bundle, recovery))
    }

    /// Unlock the hierarchy with the password
    ///
    /// An authentication failure on the master envelope is reported as
    /// [`CryptoError::WrongPassword`]; nothing distinguishes which AEAD
    /// step failed beyond that.
    pub fn unlock(&self, password: &str) -> Result<UnlockedKeys> {
        let kek = kdf::derive_kek(password, &self.password_salt, &self.kdf_params)?;
        let master = self
            .encrypted_master_key
            .unwrap_key(&kek)
            .map_err(|e| match e {
                CryptoError::AeadAuthFailure => CryptoError::WrongPassword,
                other => other,
            })?;
        self.unlock_with_master(master)
    }

    /// Rebuild the unlocked state from an already-open master key
    pub fn unlock_with_master(&self, master: SymmetricKey) -> Result<UnlockedKeys> {
        let private_bytes = self.encrypted_private_key.unwrap_bytes(&master)?;
        let private = PrivateKey::from_bytes(&private_bytes)?;
        let keypair = KeyPair::from_private_key(private);

        if keypair.public_key() != &self.public_key {
            return Err(CryptoError::CorruptEnvelope(
                "private key does not match the stored public key".to_string(),
            ));
        }
        Ok(UnlockedKeys { master, keypair })
    }

    /// Open the recovery key (requires the unlocked master)
    pub fn open_recovery_key(&self, keys: &UnlockedKeys) -> Result<SymmetricKey> {
        self.encrypted_recovery_key.unwrap_key(&keys.master)
    }

    /// Recover the master key from the one-time recovery secret
    pub fn unlock_with_recovery(&self, recovery: &SymmetricKey) -> Result<UnlockedKeys> {
        let master = self
            .master_key_encrypted_with_recovery_key
            .unwrap_key(recovery)?;
        self.unlock_with_master(master)
    }

    /// Re-wrap the master key under a new password
    ///
    /// Used both for ordinary password changes and to finish the recovery
    /// flow. A fresh salt is drawn and the KDF parameters move to the
    /// current defaults, clearing any upgrade flag.
    pub fn rewrap_password(&mut self, keys: &UnlockedKeys, new_password: &str) -> Result<()> {
        let password_salt = kdf::generate_salt();
        let kdf_params = KdfParams::default();
        let kek = kdf::derive_kek(new_password, &password_salt, &kdf_params)?;

        let version = self.encrypted_master_key.key_version;
        self.encrypted_master_key = WrappedKey::wrap(&keys.master, &kek, version)?;
        self.password_salt = password_salt;
        self.kdf_params = kdf_params;
        self.kdf_params_need_upgrade = false;
        Ok(())
    }
}

/// Open a collection key via the owner path (wrapped under the master key)
pub fn open_collection_key_as_owner(
    wrapped: &WrappedKey,
    master: &SymmetricKey,
) -> Result<SymmetricKey> {
    wrapped.unwrap_key(master)
}

/// Open a collection key via the member path (sealed to the member)
pub fn open_collection_key_as_member(sealed_key: &[u8], keypair: &KeyPair) -> Result<SymmetricKey> {
    let raw = sealed::seal_open(keypair, sealed_key)?;
    SymmetricKey::from_bytes(&raw)
}

/// Open a file key (wrapped under its collection key)
pub fn open_file_key(blob: &EncryptedBlob, collection_key: &SymmetricKey) -> Result<SymmetricKey> {
    let raw = aead::decrypt(collection_key, blob)?;
    SymmetricKey::from_bytes(&raw)
}
