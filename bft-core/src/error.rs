//! Error types for the core crate

use crate::{Height, Round, SignedMsgType};
use thiserror::Error;

/// Core validation and encoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Bincode error: {0}")]
    Bincode(String),

    #[error("Invalid public key: {0}")]
    InvalidPubKey(String),

    #[error("Unknown public key type: {0}")]
    UnknownPubKeyType(String),

    #[error("BlockID must be either empty or complete")]
    IncompleteBlockId,

    #[error("Invalid vote type: {0:?}")]
    InvalidVoteType(SignedMsgType),

    #[error("Negative height: {0}")]
    NegativeHeight(Height),

    #[error("Negative round: {0}")]
    NegativeRound(Round),

    #[error("Validator address is zero")]
    ZeroValidatorAddress,

    #[error("Negative validator index: {0}")]
    NegativeValidatorIndex(i32),

    #[error("Signature is missing")]
    MissingSignature,

    #[error("Signature is too big: max {max}, got {got}")]
    SignatureTooLong { max: usize, got: usize },

    #[error("Invalid validator address")]
    InvalidValidatorAddress,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Commit cannot be for nil block")]
    CommitForNilBlock,

    #[error("No precommits in commit")]
    NoPrecommits,

    #[error("Invalid commit vote at index {index}: expected precommit, got {got:?}")]
    NotPrecommit { index: usize, got: SignedMsgType },

    #[error("Invalid commit precommit height: expected {expected}, got {got}")]
    PrecommitHeightMismatch { expected: Height, got: Height },

    #[error("Invalid commit precommit round: expected {expected}, got {got}")]
    PrecommitRoundMismatch { expected: Round, got: Round },

    #[error("ChainID is too long: max {max}, got {got}")]
    ChainIdTooLong { max: usize, got: usize },

    #[error("Zero Header.Height")]
    ZeroHeight,

    #[error("Wrong Header.NumTxs: expected {expected}, got {got}")]
    NumTxsMismatch { expected: i64, got: i64 },

    #[error("Negative Header.TotalTxs: {0}")]
    NegativeTotalTxs(i64),

    #[error("Wrong Header.LastBlockID: {0}")]
    InvalidLastBlockId(Box<CoreError>),

    #[error("Missing LastCommit")]
    MissingLastCommit,

    #[error("Wrong LastCommit: {0}")]
    InvalidLastCommit(Box<CoreError>),

    #[error("Wrong Header.LastCommitHash")]
    LastCommitHashMismatch,

    #[error("Wrong Header.DataHash")]
    DataHashMismatch,

    #[error("Header belongs to another chain: expected '{expected}', got '{got}'")]
    ChainIdMismatch { expected: String, got: String },

    #[error("Header and commit height mismatch: header {header}, commit {commit}")]
    HeightMismatch { header: Height, commit: Height },

    #[error("Commit signs a different block than the header")]
    BlockHashMismatch,
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
