//! Evidence of validator misbehaviour

use crate::error::{EvidenceError, EvidenceResult};
use bft_core::crypto::sum;
use bft_core::merkle::simple_hash_from_byte_slices;
use bft_core::{encode_to_vec, Address, Hash, Height, PubKey, Vote};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Maximum size of a single piece of evidence in bytes
pub const MAX_EVIDENCE_BYTES: i64 = 484;

/// Evidence may take at most this fraction (1/n) of a block
pub const MAX_EVIDENCE_BYTES_DENOMINATOR: i64 = 10;

/// Maximum number of evidences in a block and their maximum total size,
/// given the maximum block size
pub fn max_evidence_per_block(block_max_bytes: i64) -> (i64, i64) {
    let max_bytes = block_max_bytes / MAX_EVIDENCE_BYTES_DENOMINATOR;
    let max_num = max_bytes / MAX_EVIDENCE_BYTES;
    (max_num, max_bytes)
}

/// Proof that a validator misbehaved
pub trait Evidence: fmt::Debug + fmt::Display + Send + Sync {
    /// Height at which the misbehaviour happened
    fn height(&self) -> Height;

    /// Address of the offending validator
    fn address(&self) -> Address;

    fn bytes(&self) -> EvidenceResult<Vec<u8>>;

    fn hash(&self) -> EvidenceResult<Hash> {
        Ok(sum(&self.bytes()?))
    }

    /// Check the evidence against the offender's public key
    fn verify(&self, chain_id: &str, pub_key: &PubKey) -> EvidenceResult<()>;

    /// Evidences are equal when their hashes are
    fn equal(&self, other: &dyn Evidence) -> bool {
        match (self.hash(), other.hash()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn validate_basic(&self) -> EvidenceResult<()>;
}

/// Two conflicting votes signed by the same validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateVoteEvidence {
    pub pub_key: PubKey,
    pub vote_a: Vote,
    pub vote_b: Vote,
}

impl DuplicateVoteEvidence {
    /// Build evidence from two votes, ordered by block ID so the same pair
    /// always produces the same evidence
    pub fn new(pub_key: PubKey, vote1: Vote, vote2: Vote) -> Self {
        let (vote_a, vote_b) = if vote1.block_id.key() < vote2.block_id.key() {
            (vote1, vote2)
        } else {
            (vote2, vote1)
        };
        Self {
            pub_key,
            vote_a,
            vote_b,
        }
    }

    fn check(&self, chain_id: &str, pub_key: &PubKey) -> EvidenceResult<()> {
        let (a, b) = (&self.vote_a, &self.vote_b);

        if a.height != b.height || a.round != b.round || a.vote_type != b.vote_type {
            return Err(EvidenceError::HrsMismatch);
        }
        if a.validator_address != b.validator_address {
            return Err(EvidenceError::ValidatorMismatch {
                a: a.validator_address,
                b: b.validator_address,
            });
        }
        if a.validator_index != b.validator_index {
            return Err(EvidenceError::IndexMismatch {
                a: a.validator_index,
                b: b.validator_index,
            });
        }
        if a.block_id == b.block_id {
            return Err(EvidenceError::SameBlockId);
        }

        // Should already hold for properly built evidence
        if pub_key.address() != a.validator_address {
            return Err(EvidenceError::PubKeyMismatch {
                key_address: pub_key.address(),
                vote_address: a.validator_address,
            });
        }

        if !pub_key.verify_bytes(&a.sign_bytes(chain_id)?, &a.signature) {
            return Err(EvidenceError::InvalidSignatureA);
        }
        if !pub_key.verify_bytes(&b.sign_bytes(chain_id)?, &b.signature) {
            return Err(EvidenceError::InvalidSignatureB);
        }
        Ok(())
    }
}

impl Evidence for DuplicateVoteEvidence {
    fn height(&self) -> Height {
        self.vote_a.height
    }

    fn address(&self) -> Address {
        self.pub_key.address()
    }

    fn bytes(&self) -> EvidenceResult<Vec<u8>> {
        Ok(encode_to_vec(&(self.pub_key, &self.vote_a, &self.vote_b))?)
    }

    /// The votes must be from the same validator, for the same
    /// height/round/type, but for different blocks
    fn verify(&self, chain_id: &str, pub_key: &PubKey) -> EvidenceResult<()> {
        self.check(chain_id, pub_key).inspect_err(|e| {
            debug!("Rejected duplicate vote evidence at height {}: {}", self.height(), e);
        })
    }

    fn validate_basic(&self) -> EvidenceResult<()> {
        self.vote_a
            .validate_basic()
            .map_err(EvidenceError::InvalidVoteA)?;
        self.vote_b
            .validate_basic()
            .map_err(EvidenceError::InvalidVoteB)?;
        Ok(())
    }
}

impl fmt::Display for DuplicateVoteEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoteA: {}; VoteB: {}", self.vote_a, self.vote_b)
    }
}

/// Evidence carried by a block
#[derive(Debug, Default)]
pub struct EvidenceList(pub Vec<Box<dyn Evidence>>);

impl EvidenceList {
    /// Merkle root of the evidence bytes, `None` for an empty list
    pub fn hash(&self) -> EvidenceResult<Option<Hash>> {
        let leaves = self
            .0
            .iter()
            .map(|ev| ev.bytes())
            .collect::<EvidenceResult<Vec<_>>>()?;
        Ok(simple_hash_from_byte_slices(&leaves))
    }

    /// True if an equal evidence is in the list
    pub fn has(&self, evidence: &dyn Evidence) -> bool {
        self.0.iter().any(|ev| ev.equal(evidence))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EvidenceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ev in &self.0 {
            write!(f, "{}\t\t", ev)?;
        }
        Ok(())
    }
}
