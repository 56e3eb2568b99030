//! Votes and their canonical signing form

use crate::crypto::MAX_SIGNATURE_SIZE;
use crate::{
    encode_to_vec, hex_bytes, Address, BlockId, CoreError, CoreResult, Height, PubKey, Round,
};
use bincode::enc::Encoder;
use bincode::error::EncodeError;
use bincode::Encode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of message a validator signs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SignedMsgType {
    Prevote = 0x01,
    Precommit = 0x02,
    Proposal = 0x20,
}

impl SignedMsgType {
    /// Prevotes and precommits are the only vote types
    pub fn is_vote_type(&self) -> bool {
        matches!(self, SignedMsgType::Prevote | SignedMsgType::Precommit)
    }
}

impl Encode for SignedMsgType {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        (*self as u8).encode(encoder)
    }
}

/// A single validator's signed statement about a block at a height and round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "type")]
    pub vote_type: SignedMsgType,
    pub height: Height,
    pub round: Round,
    /// Zero for a vote on nil
    pub block_id: BlockId,
    pub timestamp: DateTime<Utc>,
    pub validator_address: Address,
    /// Position of the signer in the validator set at `height`
    pub validator_index: i32,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// A precommit as it is stored inside a commit
pub type CommitSig = Vote;

/// Fields covered by a vote signature. The signer's address, index and the
/// signature itself are left out, so every validator signs the same bytes
/// apart from the timestamp.
#[derive(Encode)]
struct CanonicalVote {
    chain_id: String,
    vote_type: SignedMsgType,
    height: Height,
    round: Round,
    block_id: BlockId,
    timestamp: (i64, u32),
}

impl Vote {
    /// Bytes a validator signs for this vote on `chain_id`
    pub fn sign_bytes(&self, chain_id: &str) -> CoreResult<Vec<u8>> {
        encode_to_vec(&CanonicalVote {
            chain_id: chain_id.to_string(),
            vote_type: self.vote_type,
            height: self.height,
            round: self.round,
            block_id: self.block_id.clone(),
            timestamp: timestamp_parts(&self.timestamp),
        })
    }

    /// Full encoding of the vote, signature included
    pub fn bytes(&self) -> CoreResult<Vec<u8>> {
        encode_to_vec(self)
    }

    /// Stateless sanity checks. Does not check the signature.
    pub fn validate_basic(&self) -> CoreResult<()> {
        if !self.vote_type.is_vote_type() {
            return Err(CoreError::InvalidVoteType(self.vote_type));
        }
        if self.height < 0 {
            return Err(CoreError::NegativeHeight(self.height));
        }
        if self.round < 0 {
            return Err(CoreError::NegativeRound(self.round));
        }
        self.block_id.validate_basic()?;
        if self.validator_address.is_zero() {
            return Err(CoreError::ZeroValidatorAddress);
        }
        if self.validator_index < 0 {
            return Err(CoreError::NegativeValidatorIndex(self.validator_index));
        }
        if self.signature.is_empty() {
            return Err(CoreError::MissingSignature);
        }
        if self.signature.len() > MAX_SIGNATURE_SIZE {
            return Err(CoreError::SignatureTooLong {
                max: MAX_SIGNATURE_SIZE,
                got: self.signature.len(),
            });
        }
        Ok(())
    }

    /// Check that `pub_key` belongs to the voter and signed this vote
    pub fn verify(&self, chain_id: &str, pub_key: &PubKey) -> CoreResult<()> {
        if pub_key.address() != self.validator_address {
            return Err(CoreError::InvalidValidatorAddress);
        }
        let sign_bytes = self.sign_bytes(chain_id)?;
        if !pub_key.verify_bytes(&sign_bytes, &self.signature) {
            return Err(CoreError::InvalidSignature);
        }
        Ok(())
    }
}

impl Encode for Vote {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.vote_type.encode(encoder)?;
        self.height.encode(encoder)?;
        self.round.encode(encoder)?;
        self.block_id.encode(encoder)?;
        timestamp_parts(&self.timestamp).encode(encoder)?;
        self.validator_address.encode(encoder)?;
        self.validator_index.encode(encoder)?;
        self.signature.encode(encoder)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sig_prefix = &self.signature[..self.signature.len().min(6)];
        write!(
            f,
            "Vote{{{}:{} {}/{:02}/{:?} {} {} @ {}}}",
            self.validator_index,
            self.validator_address,
            self.height,
            self.round,
            self.vote_type,
            self.block_id,
            hex::encode_upper(sig_prefix),
            self.timestamp.to_rfc3339(),
        )
    }
}

/// Seconds and nanoseconds since the Unix epoch
pub(crate) fn timestamp_parts(time: &DateTime<Utc>) -> (i64, u32) {
    (time.timestamp(), time.timestamp_subsec_nanos())
}
