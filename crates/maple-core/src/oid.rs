//! Entity identifiers
//!
//! Every entity carries a 12-byte id: 4 bytes of big-endian unix seconds
//! followed by 8 random bytes. Ids sort roughly by creation time, which
//! the sync cursor relies on for tie-breaking, and travel hex-encoded on
//! the wire. Ids are unified: the id a client assigns at creation is the
//! id the cloud persists, end to end.

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Byte length of an [`Oid`]
pub const OID_LEN: usize = 12;

/// A 12-byte time-ordered entity identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; OID_LEN]);

impl Oid {
    /// Generate a fresh id stamped with the current time
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now())
    }

    /// Generate an id with an explicit timestamp prefix
    pub fn with_timestamp(at: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; OID_LEN];
        let secs = at.timestamp().max(0) as u32;
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes[4..]);
        Self(bytes)
    }

    /// Rebuild from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OidParseError> {
        if bytes.len() != OID_LEN {
            return Err(OidParseError::Length(bytes.len()));
        }
        let mut arr = [0u8; OID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    /// Hex wire form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The creation instant embedded in the id
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_else(Utc::now)
    }
}

impl Default for Oid {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure to parse an [`Oid`] from its wire form
#[derive(Debug, thiserror::Error)]
pub enum OidParseError {
    #[error("oid must be {OID_LEN} bytes, got {0}")]
    Length(usize),
    #[error("oid is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
