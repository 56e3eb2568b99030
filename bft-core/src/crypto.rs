//! Hashing and Ed25519 key primitives

use crate::{Address, CoreError, CoreResult, Hash, ADDRESS_SIZE};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Type tag of Ed25519 public keys, as it appears in genesis files and
/// consensus parameters
pub const PUB_KEY_TYPE_ED25519: &str = "ed25519";

/// Size of an Ed25519 public key in bytes
pub const PUB_KEY_SIZE: usize = 32;

/// Maximum accepted signature size in bytes
pub const MAX_SIGNATURE_SIZE: usize = 64;

/// Keccak-256 of the given bytes
pub fn sum(bytes: &[u8]) -> Hash {
    let digest = Keccak256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash::new(out)
}

/// First 20 bytes of the Keccak-256 of the given bytes
pub fn sum_truncated(bytes: &[u8]) -> Address {
    let digest = Keccak256::digest(bytes);
    let mut addr = [0u8; ADDRESS_SIZE];
    addr.copy_from_slice(&digest[..ADDRESS_SIZE]);
    Address::new(addr)
}

/// Ed25519 public key of a validator
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode)]
#[serde(try_from = "PubKeyJson", into = "PubKeyJson")]
pub struct PubKey([u8; PUB_KEY_SIZE]);

impl PubKey {
    /// Parse a public key, rejecting bytes that are not a valid curve point
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let raw: [u8; PUB_KEY_SIZE] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
            expected: PUB_KEY_SIZE,
            got: bytes.len(),
        })?;
        VerifyingKey::from_bytes(&raw).map_err(|e| CoreError::InvalidPubKey(e.to_string()))?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.0
    }

    pub fn key_type(&self) -> &'static str {
        PUB_KEY_TYPE_ED25519
    }

    /// Address derived from the key bytes
    pub fn address(&self) -> Address {
        sum_truncated(&self.0)
    }

    /// Check `signature` over `msg`. Malformed keys or signatures never verify.
    pub fn verify_bytes(&self, msg: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(msg, &sig).is_ok()
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKeyEd25519{{{}}}", hex::encode_upper(self.0))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// JSON shape of a public key: `{"type": "ed25519", "value": "<hex>"}`
#[derive(Serialize, Deserialize)]
struct PubKeyJson {
    #[serde(rename = "type")]
    key_type: String,
    value: String,
}

impl From<PubKey> for PubKeyJson {
    fn from(key: PubKey) -> Self {
        Self {
            key_type: PUB_KEY_TYPE_ED25519.to_string(),
            value: hex::encode(key.0),
        }
    }
}

impl TryFrom<PubKeyJson> for PubKey {
    type Error = CoreError;

    fn try_from(json: PubKeyJson) -> CoreResult<Self> {
        if json.key_type != PUB_KEY_TYPE_ED25519 {
            return Err(CoreError::UnknownPubKeyType(json.key_type));
        }
        let bytes = hex::decode(json.value.trim_start_matches("0x"))?;
        Self::from_bytes(&bytes)
    }
}

/// Ed25519 signing key
#[derive(Clone)]
pub struct PrivKey {
    key: SigningKey,
}

impl PrivKey {
    /// Generate a fresh key from random seed bytes
    pub fn generate() -> Self {
        Self::from_seed(rand::random())
    }

    /// Deterministic key from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn pub_key(&self) -> PubKey {
        PubKey(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.key.sign(msg).to_bytes().to_vec()
    }
}

impl fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivKey")
            .field("pub_key", &self.pub_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = PrivKey::from_seed([7u8; 32]);
        let pub_key = key.pub_key();
        let sig = key.sign(b"hello");

        assert_eq!(sig.len(), MAX_SIGNATURE_SIZE);
        assert!(pub_key.verify_bytes(b"hello", &sig));
        assert!(!pub_key.verify_bytes(b"hellO", &sig));
        assert!(!pub_key.verify_bytes(b"hello", &sig[..63]));

        let other = PrivKey::from_seed([8u8; 32]).pub_key();
        assert!(!other.verify_bytes(b"hello", &sig));
    }

    #[test]
    fn test_address_is_truncated_hash() {
        let pub_key = PrivKey::from_seed([1u8; 32]).pub_key();
        let full = sum(pub_key.as_bytes());
        assert_eq!(pub_key.address().as_bytes()[..], full.as_bytes()[..ADDRESS_SIZE]);
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(sum(b"abc"), sum(b"abc"));
        assert_ne!(sum(b"abc"), sum(b"abd"));
    }

    #[test]
    fn test_pub_key_json() {
        let pub_key = PrivKey::generate().pub_key();
        let json = serde_json::to_value(pub_key).unwrap();
        assert_eq!(json["type"], "ed25519");

        let back: PubKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, pub_key);

        let unknown = serde_json::json!({ "type": "secp256k1", "value": "00" });
        assert!(serde_json::from_value::<PubKey>(unknown).is_err());
    }

    #[test]
    fn test_pub_key_length_checked() {
        assert!(matches!(
            PubKey::from_bytes(&[0u8; 31]),
            Err(CoreError::InvalidLength { expected: 32, got: 31 })
        ));
    }
}
