//! Commits: the precommits that finalize a block

use crate::merkle::simple_hash_from_byte_slices;
use crate::{BlockId, CommitSig, CoreError, CoreResult, Hash, Height, Round, SignedMsgType, Vote};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Evidence that a block was committed by a set of validators.
///
/// Precommits are indexed like the validator set at the commit's height, so
/// peers can exchange them by index. A `None` slot means no precommit was
/// received from that validator.
#[derive(Debug, Serialize, Deserialize)]
pub struct Commit {
    pub block_id: BlockId,
    precommits: Vec<Option<CommitSig>>,
    #[serde(skip)]
    hash: OnceLock<Option<Hash>>,
}

impl Commit {
    pub fn new(block_id: BlockId, precommits: Vec<Option<CommitSig>>) -> Self {
        Self {
            block_id,
            precommits,
            hash: OnceLock::new(),
        }
    }

    pub fn precommits(&self) -> &[Option<CommitSig>] {
        &self.precommits
    }

    /// Mutable precommit access. Drops the memoized hash.
    pub fn precommits_mut(&mut self) -> &mut Vec<Option<CommitSig>> {
        self.hash = OnceLock::new();
        &mut self.precommits
    }

    fn first_precommit(&self) -> Option<&CommitSig> {
        self.precommits.iter().flatten().next()
    }

    /// Height of the first present precommit, 0 if there is none
    pub fn height(&self) -> Height {
        self.first_precommit().map_or(0, |p| p.height)
    }

    /// Round of the first present precommit, 0 if there is none
    pub fn round(&self) -> Round {
        self.first_precommit().map_or(0, |p| p.round)
    }

    pub fn vote_type(&self) -> SignedMsgType {
        SignedMsgType::Precommit
    }

    /// Number of precommit slots, present or not
    pub fn size(&self) -> usize {
        self.precommits.len()
    }

    /// True if there is at least one precommit slot
    pub fn is_commit(&self) -> bool {
        !self.precommits.is_empty()
    }

    /// Which validator slots carry a precommit
    pub fn bit_array(&self) -> Vec<bool> {
        self.precommits.iter().map(Option::is_some).collect()
    }

    /// Reconstruct the vote for slot `index`, or `None` if the slot is empty
    /// or out of range.
    ///
    /// The vote keeps the precommit's own block ID, which may be nil or a
    /// different block than the commit's.
    pub fn get_vote(&self, index: usize) -> Option<Vote> {
        let sig = self.precommits.get(index)?.as_ref()?;
        Some(Vote {
            vote_type: SignedMsgType::Precommit,
            height: self.height(),
            round: self.round(),
            block_id: sig.block_id.clone(),
            timestamp: sig.timestamp,
            validator_address: sig.validator_address,
            validator_index: index as i32,
            signature: sig.signature.clone(),
        })
    }

    /// Sign bytes of the vote in slot `index`, if there is one
    pub fn vote_sign_bytes(&self, chain_id: &str, index: usize) -> CoreResult<Option<Vec<u8>>> {
        self.get_vote(index)
            .map(|vote| vote.sign_bytes(chain_id))
            .transpose()
    }

    /// Stateless consistency checks. Does not check signatures.
    pub fn validate_basic(&self) -> CoreResult<()> {
        if self.block_id.is_zero() {
            return Err(CoreError::CommitForNilBlock);
        }
        if self.precommits.is_empty() {
            return Err(CoreError::NoPrecommits);
        }
        let (height, round) = (self.height(), self.round());

        for (index, precommit) in self.precommits.iter().enumerate() {
            let Some(precommit) = precommit else {
                continue;
            };
            if precommit.vote_type != SignedMsgType::Precommit {
                return Err(CoreError::NotPrecommit {
                    index,
                    got: precommit.vote_type,
                });
            }
            if precommit.height != height {
                return Err(CoreError::PrecommitHeightMismatch {
                    expected: height,
                    got: precommit.height,
                });
            }
            if precommit.round != round {
                return Err(CoreError::PrecommitRoundMismatch {
                    expected: round,
                    got: precommit.round,
                });
            }
        }
        Ok(())
    }

    /// Merkle root over the encoded precommits, empty slots as empty leaves
    pub fn hash(&self) -> CoreResult<Option<Hash>> {
        if let Some(hash) = self.hash.get() {
            return Ok(*hash);
        }
        let leaves = self
            .precommits
            .iter()
            .map(|p| match p {
                Some(sig) => sig.bytes(),
                None => Ok(Vec::new()),
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let hash = simple_hash_from_byte_slices(&leaves);
        let _ = self.hash.set(hash);
        Ok(hash)
    }
}

impl Clone for Commit {
    fn clone(&self) -> Self {
        Self {
            block_id: self.block_id.clone(),
            precommits: self.precommits.clone(),
            hash: self.hash.clone(),
        }
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.block_id == other.block_id && self.precommits == other.precommits
    }
}

impl Eq for Commit {}

#[cfg(test)]
pub(crate) fn test_commit(height: Height, round: Round, validators: u8) -> Commit {
    use crate::{PartSetHeader, PrivKey};
    use chrono::{TimeZone, Utc};

    let block_id = BlockId {
        hash: Some(crate::crypto::sum(b"block")),
        parts: PartSetHeader {
            total: 1,
            hash: Some(crate::crypto::sum(b"parts")),
        },
    };
    let precommits = (0..validators)
        .map(|i| {
            let key = PrivKey::from_seed([i + 1; 32]);
            let mut vote = Vote {
                vote_type: SignedMsgType::Precommit,
                height,
                round,
                block_id: block_id.clone(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                validator_address: key.pub_key().address(),
                validator_index: i as i32,
                signature: Vec::new(),
            };
            vote.signature = key.sign(&vote.sign_bytes("test-chain").unwrap());
            Some(vote)
        })
        .collect();
    Commit::new(block_id, precommits)
}
