//! Validator sets and commit verification for a BFT chain
//!
//! This crate tracks the weighted validator set, rotates the block proposer
//! by priority, applies validator updates, and verifies that a commit carries
//! more than two thirds of the voting power. It also holds the evidence,
//! consensus parameter and genesis types that sit next to the validator set.

pub mod error;
pub mod evidence;
pub mod genesis;
pub mod params;
pub mod validator;
pub mod validator_set;

pub use error::{
    CommitError, CommitResult, EvidenceError, EvidenceResult, GenesisError, GenesisResult,
    ParamsError, ParamsResult, ValidatorSetError, ValidatorSetResult,
};
pub use evidence::{DuplicateVoteEvidence, Evidence, EvidenceList};
pub use genesis::{GenesisDoc, GenesisValidator};
pub use params::{BlockParams, ConsensusParams, ValidatorParams};
pub use validator::Validator;
pub use validator_set::{ValidatorSet, MAX_TOTAL_VOTING_POWER};

#[cfg(test)]
pub(crate) mod test_util {
    use crate::{Validator, ValidatorSet};
    use bft_core::crypto::sum;
    use bft_core::{
        BlockId, Commit, Height, PartSetHeader, PrivKey, Round, SignedMsgType, Vote,
    };
    use chrono::{TimeZone, Utc};

    pub const TEST_CHAIN_ID: &str = "test-chain";

    pub fn rand_validator(power: i64) -> Validator {
        Validator::new(PrivKey::generate().pub_key(), power)
    }

    /// A set of `n` validators with equal power and their keys, in set order
    pub fn rand_validator_set(n: usize, power: i64) -> (ValidatorSet, Vec<PrivKey>) {
        let keys: Vec<PrivKey> = (0..n).map(|_| PrivKey::generate()).collect();
        let set = ValidatorSet::new(
            keys.iter()
                .map(|k| Validator::new(k.pub_key(), power))
                .collect(),
        )
        .unwrap();

        let ordered = set
            .validators()
            .iter()
            .map(|v| {
                keys.iter()
                    .find(|k| k.pub_key().address() == v.address)
                    .cloned()
                    .unwrap()
            })
            .collect();
        (set, ordered)
    }

    /// A complete block ID derived from `seed`
    pub fn block_id(seed: &[u8]) -> BlockId {
        BlockId {
            hash: Some(sum(seed)),
            parts: PartSetHeader {
                total: 1,
                hash: Some(sum(&[seed, b"parts"].concat())),
            },
        }
    }

    pub fn signed_vote(
        key: &PrivKey,
        index: i32,
        height: Height,
        round: Round,
        vote_type: SignedMsgType,
        block_id: BlockId,
    ) -> Vote {
        let mut vote = Vote {
            vote_type,
            height,
            round,
            block_id,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            validator_address: key.pub_key().address(),
            validator_index: index,
            signature: Vec::new(),
        };
        vote.signature = key.sign(&vote.sign_bytes(TEST_CHAIN_ID).unwrap());
        vote
    }

    /// Commit where the first `signers` validators precommit for `block_id`
    pub fn make_commit(
        set: &ValidatorSet,
        keys: &[PrivKey],
        block_id: &BlockId,
        height: Height,
        round: Round,
        signers: usize,
    ) -> Commit {
        let precommits = keys
            .iter()
            .take(set.size())
            .enumerate()
            .map(|(i, key)| {
                (i < signers).then(|| {
                    signed_vote(
                        key,
                        i as i32,
                        height,
                        round,
                        SignedMsgType::Precommit,
                        block_id.clone(),
                    )
                })
            })
            .collect();
        Commit::new(block_id.clone(), precommits)
    }
}
