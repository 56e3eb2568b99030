//! Genesis document: the chain's bootstrap configuration
//!
//! Holds the chain identity, the initial validators and the consensus
//! parameters. Stored as JSON and loaded once before the chain starts.

use crate::error::{GenesisError, GenesisResult};
use crate::params::ConsensusParams;
use crate::validator::Validator;
use crate::validator_set::ValidatorSet;
use bft_core::{hex_bytes, Address, Hash, PubKey, MAX_CHAIN_ID_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// A validator present at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Derived from `pub_key` when left empty
    #[serde(default)]
    pub address: Address,
    pub pub_key: PubKey,
    pub power: i64,
    #[serde(default)]
    pub name: String,
}

/// Initial conditions of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisDoc {
    #[serde(default)]
    pub genesis_time: Option<DateTime<Utc>>,
    pub chain_id: String,
    #[serde(default)]
    pub consensus_params: ConsensusParams,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default, with = "hex_bytes")]
    pub app_hash: Vec<u8>,
    #[serde(default)]
    pub app_state: serde_json::Value,
}

impl GenesisDoc {
    /// Load a genesis document from a JSON file, completing missing fields
    pub fn from_file<P: AsRef<Path>>(path: P) -> GenesisResult<Self> {
        let path = path.as_ref();
        info!("Loading genesis from {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| GenesisError::File {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Parse a genesis document from JSON, completing missing fields
    pub fn from_json(json: &str) -> GenesisResult<Self> {
        let mut doc: GenesisDoc = serde_json::from_str(json)?;
        doc.validate_and_complete()?;
        Ok(doc)
    }

    /// Write the document as pretty-printed JSON
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> GenesisResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| GenesisError::File {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Saved genesis for chain {} to {:?}", self.chain_id, path);
        Ok(())
    }

    fn validate_chain_id(&self) -> GenesisResult<()> {
        if self.chain_id.is_empty() {
            return Err(GenesisError::EmptyChainId);
        }
        if self.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(GenesisError::LongChainId {
                max: MAX_CHAIN_ID_LEN,
                got: self.chain_id.len(),
            });
        }
        Ok(())
    }

    /// Strict validation of a complete document
    pub fn validate(&self) -> GenesisResult<()> {
        debug!("Validating genesis for chain {}", self.chain_id);
        self.validate_chain_id()?;

        if self.genesis_time.is_none() {
            return Err(GenesisError::InvalidGenesisTime);
        }
        self.consensus_params.validate()?;

        if self.validators.is_empty() {
            return Err(GenesisError::NoValidators);
        }
        for (index, val) in self.validators.iter().enumerate() {
            if val.power == 0 {
                return Err(GenesisError::InvalidValidatorVotingPower { index });
            }
            if val.address.is_zero() {
                return Err(GenesisError::InvalidValidatorAddress { index });
            }
            if val.pub_key.address() != val.address {
                return Err(GenesisError::ValidatorPubKeyMismatch { index });
            }
        }
        Ok(())
    }

    /// Lenient validation used when bootstrapping.
    ///
    /// Fills in validator addresses from their keys, a missing genesis time
    /// with the current time, and missing consensus parameter sections with
    /// defaults. Validators may be absent; the application can supply them
    /// at chain start.
    pub fn validate_and_complete(&mut self) -> GenesisResult<()> {
        self.validate_chain_id()?;

        self.consensus_params.fill_defaults();
        self.consensus_params.validate()?;

        for (index, val) in self.validators.iter_mut().enumerate() {
            if val.power == 0 {
                return Err(GenesisError::InvalidValidatorVotingPower { index });
            }
            let derived = val.pub_key.address();
            if val.address.is_zero() {
                val.address = derived;
            } else if val.address != derived {
                return Err(GenesisError::ValidatorPubKeyMismatch { index });
            }
        }

        if self.genesis_time.is_none() {
            self.genesis_time = Some(Utc::now());
        }
        debug!(
            "Completed genesis for chain {} with {} validator(s)",
            self.chain_id,
            self.validators.len()
        );
        Ok(())
    }

    /// Initial validator set with the first proposer selected
    pub fn validator_set(&self) -> GenesisResult<ValidatorSet> {
        let validators = self
            .validators
            .iter()
            .map(|v| Validator::new(v.pub_key, v.power))
            .collect();
        Ok(ValidatorSet::new(validators)?)
    }

    /// Hash of the initial validator set
    pub fn validator_hash(&self) -> GenesisResult<Option<Hash>> {
        Ok(self.validator_set()?.hash()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BlockParams;
    use bft_core::PrivKey;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn genesis_validator(power: i64) -> GenesisValidator {
        let pub_key = PrivKey::generate().pub_key();
        GenesisValidator {
            address: pub_key.address(),
            pub_key,
            power,
            name: "validator".to_string(),
        }
    }

    fn genesis_doc() -> GenesisDoc {
        GenesisDoc {
            genesis_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            chain_id: "test-chain".to_string(),
            consensus_params: ConsensusParams::default(),
            validators: vec![genesis_validator(10), genesis_validator(5)],
            app_hash: vec![0xab, 0xcd],
            app_state: serde_json::json!({ "accounts": [] }),
        }
    }

    #[test]
    fn test_valid_genesis() {
        assert!(genesis_doc().validate().is_ok());
    }

    #[test]
    fn test_chain_id_length() {
        let mut doc = genesis_doc();
        doc.chain_id = "a".repeat(MAX_CHAIN_ID_LEN);
        assert!(doc.validate().is_ok());

        doc.chain_id = "a".repeat(MAX_CHAIN_ID_LEN + 1);
        assert!(matches!(
            doc.validate(),
            Err(GenesisError::LongChainId { max: 50, got: 51 })
        ));

        doc.chain_id = String::new();
        assert!(matches!(doc.validate(), Err(GenesisError::EmptyChainId)));
        assert!(matches!(
            doc.validate_and_complete(),
            Err(GenesisError::EmptyChainId)
        ));
    }

    #[test]
    fn test_invalid_validators() {
        let mut doc = genesis_doc();
        doc.validators[1].power = 0;
        assert!(matches!(
            doc.validate(),
            Err(GenesisError::InvalidValidatorVotingPower { index: 1 })
        ));

        let mut doc = genesis_doc();
        doc.validators[0].address = Address::zero();
        assert!(matches!(
            doc.validate(),
            Err(GenesisError::InvalidValidatorAddress { index: 0 })
        ));

        let mut doc = genesis_doc();
        doc.validators[0].address = doc.validators[1].address;
        assert!(matches!(
            doc.validate(),
            Err(GenesisError::ValidatorPubKeyMismatch { index: 0 })
        ));

        let mut doc = genesis_doc();
        doc.validators.clear();
        assert!(matches!(doc.validate(), Err(GenesisError::NoValidators)));
    }

    #[test]
    fn test_missing_time_and_bad_params() {
        let mut doc = genesis_doc();
        doc.genesis_time = None;
        assert!(matches!(doc.validate(), Err(GenesisError::InvalidGenesisTime)));

        let mut doc = genesis_doc();
        doc.consensus_params.block = Some(BlockParams {
            time_iota_ms: 0,
            ..BlockParams::default()
        });
        assert!(matches!(
            doc.validate(),
            Err(GenesisError::InvalidConsensusParams(_))
        ));
    }

    #[test]
    fn test_validate_and_complete() {
        let mut doc = genesis_doc();
        doc.genesis_time = None;
        doc.consensus_params.validator = None;
        let expected_address = doc.validators[0].address;
        doc.validators[0].address = Address::zero();

        doc.validate_and_complete().unwrap();
        assert!(doc.genesis_time.is_some());
        assert_eq!(doc.consensus_params, ConsensusParams::default());
        assert_eq!(doc.validators[0].address, expected_address);
        assert!(doc.validate().is_ok());

        let mut doc = genesis_doc();
        doc.validators.clear();
        assert!(doc.validate_and_complete().is_ok());

        let mut doc = genesis_doc();
        doc.validators[0].address = doc.validators[1].address;
        assert!(matches!(
            doc.validate_and_complete(),
            Err(GenesisError::ValidatorPubKeyMismatch { index: 0 })
        ));

        let mut doc = genesis_doc();
        doc.validators[0].power = 0;
        assert!(matches!(
            doc.validate_and_complete(),
            Err(GenesisError::InvalidValidatorVotingPower { index: 0 })
        ));
    }

    #[test]
    fn test_minimal_json() {
        let pub_key = PrivKey::generate().pub_key();
        let json = format!(
            r#"{{
                "chain_id": "minimal",
                "validators": [
                    {{ "pub_key": {{ "type": "ed25519", "value": "{}" }}, "power": 7 }}
                ]
            }}"#,
            hex::encode(pub_key.as_bytes())
        );

        let doc = GenesisDoc::from_json(&json).unwrap();
        assert_eq!(doc.chain_id, "minimal");
        assert_eq!(doc.validators[0].address, pub_key.address());
        assert!(doc.genesis_time.is_some());
        assert!(doc.validate().is_ok());

        assert!(GenesisDoc::from_json("{ not json").is_err());
        assert!(matches!(
            GenesisDoc::from_json(r#"{ "chain_id": "" }"#),
            Err(GenesisError::EmptyChainId)
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("genesis.json");

        let doc = genesis_doc();
        doc.save_as(&path).unwrap();
        let loaded = GenesisDoc::from_file(&path).unwrap();

        assert_eq!(loaded.chain_id, doc.chain_id);
        assert_eq!(loaded.validators, doc.validators);
        assert_eq!(loaded.consensus_params, doc.consensus_params);
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = GenesisDoc::from_file(dir.path().join("missing.json"));
        assert!(matches!(result, Err(GenesisError::File { .. })));
    }

    #[test]
    fn test_validator_set_from_genesis() {
        let doc = genesis_doc();
        let set = doc.validator_set().unwrap();
        assert_eq!(set.size(), 2);
        assert_eq!(set.total_voting_power(), 15);
        assert!(set.get_proposer().is_some());
        assert_eq!(doc.validator_hash().unwrap(), set.hash().unwrap());
    }
}
