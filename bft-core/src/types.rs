//! Basic consensus types

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Block height. Signed so that malformed negative heights can be detected.
pub type Height = i64;

/// Consensus round within a height
pub type Round = i32;

/// Size of a hash in bytes
pub const HASH_SIZE: usize = 32;

/// Size of an address in bytes
pub const ADDRESS_SIZE: usize = 20;

/// 32-byte hash type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, bincode::Encode)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a new hash from byte array
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create hash from slice, failing if the length is wrong
    pub fn from_slice(slice: &[u8]) -> CoreResult<Self> {
        let bytes: [u8; HASH_SIZE] = slice.try_into().map_err(|_| CoreError::InvalidLength {
            expected: HASH_SIZE,
            got: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string, with or without a `0x` prefix
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        let bytes = hex::decode(hex.trim_start_matches("0x"))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 20-byte validator address
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, bincode::Encode,
)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Create a new address from byte array
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create address from slice, failing if the length is wrong
    pub fn from_slice(slice: &[u8]) -> CoreResult<Self> {
        let bytes: [u8; ADDRESS_SIZE] =
            slice.try_into().map_err(|_| CoreError::InvalidLength {
                expected: ADDRESS_SIZE,
                got: slice.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string, with or without a `0x` prefix
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        let bytes = hex::decode(hex.trim_start_matches("0x"))?;
        Self::from_slice(&bytes)
    }

    /// Zero address (all bytes are 0)
    pub fn zero() -> Self {
        Self([0u8; ADDRESS_SIZE])
    }

    /// The zero address marks an unset address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Self::zero());
        }
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode a value with the standard bincode configuration used for hashing
/// and signing
pub fn encode_to_vec<T: bincode::Encode>(value: &T) -> CoreResult<Vec<u8>> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CoreError::Bincode(e.to_string()))
}

/// Serde helper for variable-length byte fields encoded as hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
