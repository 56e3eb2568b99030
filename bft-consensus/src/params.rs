//! Consensus parameters

use crate::error::{ParamsError, ParamsResult};
use bft_core::crypto::PUB_KEY_TYPE_ED25519;
use bft_core::merkle::simple_hash_from_byte_slices;
use bft_core::{encode_to_vec, CoreResult, Hash};
use serde::{Deserialize, Serialize};

/// Largest block size consensus will ever accept (100 MiB)
pub const MAX_BLOCK_SIZE_BYTES: i64 = 104_857_600;

/// Public key types a chain may admit for validators
pub const KNOWN_PUB_KEY_TYPES: &[&str] = &[PUB_KEY_TYPE_ED25519];

/// Parameters that influence block validity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub block: Option<BlockParams>,
    pub validator: Option<ValidatorParams>,
}

/// Limits on block size and gas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct BlockParams {
    pub max_tx_bytes: i64,
    pub max_data_bytes: i64,
    /// -1 means unlimited
    pub max_gas: i64,
    /// Minimum time increment between consecutive blocks in milliseconds
    pub time_iota_ms: i64,
}

/// Restrictions on validator keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block: Some(BlockParams::default()),
            validator: Some(ValidatorParams::default()),
        }
    }
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            max_tx_bytes: 1_048_576,   // 1MB
            max_data_bytes: 2_097_152, // 2MB
            max_gas: 10_000_000,
            time_iota_ms: 100,
        }
    }
}

impl Default for ValidatorParams {
    fn default() -> Self {
        Self {
            pub_key_types: vec![PUB_KEY_TYPE_ED25519.to_string()],
        }
    }
}

impl ConsensusParams {
    /// Check that all sections are present and within bounds
    pub fn validate(&self) -> ParamsResult<()> {
        let block = self.block.as_ref().ok_or(ParamsError::MissingBlockParams)?;
        let validator = self
            .validator
            .as_ref()
            .ok_or(ParamsError::MissingValidatorParams)?;

        if block.max_tx_bytes <= 0 || block.max_tx_bytes > MAX_BLOCK_SIZE_BYTES {
            return Err(ParamsError::MaxTxBytes {
                max: MAX_BLOCK_SIZE_BYTES,
                got: block.max_tx_bytes,
            });
        }
        if block.max_data_bytes <= 0 || block.max_data_bytes > MAX_BLOCK_SIZE_BYTES {
            return Err(ParamsError::MaxDataBytes {
                max: MAX_BLOCK_SIZE_BYTES,
                got: block.max_data_bytes,
            });
        }
        if block.max_gas < -1 {
            return Err(ParamsError::MaxGas(block.max_gas));
        }
        if block.time_iota_ms <= 0 {
            return Err(ParamsError::TimeIota(block.time_iota_ms));
        }

        if validator.pub_key_types.is_empty() {
            return Err(ParamsError::NoPubKeyTypes);
        }
        for (index, key_type) in validator.pub_key_types.iter().enumerate() {
            if !KNOWN_PUB_KEY_TYPES.contains(&key_type.as_str()) {
                return Err(ParamsError::UnknownPubKeyType {
                    index,
                    key_type: key_type.clone(),
                });
            }
        }
        Ok(())
    }

    /// Fill missing sections with their defaults
    pub fn fill_defaults(&mut self) {
        if self.block.is_none() {
            self.block = Some(BlockParams::default());
        }
        if self.validator.is_none() {
            self.validator = Some(ValidatorParams::default());
        }
    }

    /// Merkle root of the encoded sections, used as the header's consensus
    /// hash
    pub fn hash(&self) -> CoreResult<Option<Hash>> {
        let leaves = vec![
            encode_to_vec(&self.block)?,
            encode_to_vec(&self.validator)?,
        ];
        Ok(simple_hash_from_byte_slices(&leaves))
    }
}
