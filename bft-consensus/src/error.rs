//! Consensus error types

use bft_core::{Address, CoreError, Height, Round, SignedMsgType};
use std::path::PathBuf;
use thiserror::Error;

/// Rejected validator set change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidatorSetError {
    #[error("Validator has zero address")]
    ZeroAddress,

    #[error("Validator address {address} does not match its public key")]
    AddressMismatch { address: Address },

    #[error("Duplicate entry {address} in change set")]
    DuplicateEntry { address: Address },

    #[error("Voting power can't be negative: {power} for {address}")]
    NegativeVotingPower { address: Address, power: i64 },

    #[error("Voting power {power} of {address} exceeds max allowed {max}")]
    VotingPowerTooHigh { address: Address, power: i64, max: i64 },

    #[error("Total voting power of resulting validator set exceeds max {max}")]
    ExceedsMaxTotalVotingPower { max: i64 },

    #[error("Validator removals are not allowed here")]
    RemovalsNotAllowed,

    #[error("Failed to find validator {address} to remove")]
    UnknownValidatorToRemove { address: Address },

    #[error("Applying the validator changes would result in empty set")]
    ResultingSetEmpty,
}

/// Commit verification failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    #[error("Invalid commit: {0}")]
    Invalid(#[from] CoreError),

    #[error("Invalid commit: wrong set size: {expected} vs {got}")]
    PrecommitCount { expected: usize, got: usize },

    #[error("Invalid commit: wrong height: {expected} vs {got}")]
    Height { expected: Height, got: Height },

    #[error("Invalid commit: wrong block ID")]
    WrongBlockId,

    #[error("Invalid commit: invalid signature #{index}: {source}")]
    InvalidSignature { index: usize, source: CoreError },

    #[error("Invalid commit: precommit #{index} is for height {got}, expected {expected}")]
    PrecommitHeight {
        index: usize,
        expected: Height,
        got: Height,
    },

    #[error("Invalid commit: precommit #{index} is for round {got}, expected {expected}")]
    PrecommitRound {
        index: usize,
        expected: Round,
        got: Round,
    },

    #[error("Invalid commit: precommit #{index} has type {got:?}")]
    PrecommitType { index: usize, got: SignedMsgType },

    #[error("Invalid commit: insufficient voting power: got {got}, needed {needed}")]
    TooMuchChange { got: i64, needed: i64 },
}

/// Invalid evidence of misbehaviour
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvidenceError {
    #[error("Votes are for different height/round/type")]
    HrsMismatch,

    #[error("Votes are from different validators: {a} vs {b}")]
    ValidatorMismatch { a: Address, b: Address },

    #[error("Votes have different validator indices: {a} vs {b}")]
    IndexMismatch { a: i32, b: i32 },

    #[error("Votes are for the same block ID")]
    SameBlockId,

    #[error("Public key address {key_address} does not match vote address {vote_address}")]
    PubKeyMismatch {
        key_address: Address,
        vote_address: Address,
    },

    #[error("Invalid signature on vote A")]
    InvalidSignatureA,

    #[error("Invalid signature on vote B")]
    InvalidSignatureB,

    #[error("Invalid vote A: {0}")]
    InvalidVoteA(CoreError),

    #[error("Invalid vote B: {0}")]
    InvalidVoteB(CoreError),

    #[error("Evidence encoding failed: {0}")]
    Encoding(#[from] CoreError),
}

/// Invalid consensus parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Block params are missing")]
    MissingBlockParams,

    #[error("Validator params are missing")]
    MissingValidatorParams,

    #[error("Block.MaxTxBytes must be in (0, {max}], got {got}")]
    MaxTxBytes { max: i64, got: i64 },

    #[error("Block.MaxDataBytes must be in (0, {max}], got {got}")]
    MaxDataBytes { max: i64, got: i64 },

    #[error("Block.MaxGas must be greater or equal to -1, got {0}")]
    MaxGas(i64),

    #[error("Block.TimeIotaMS must be greater than 0, got {0}")]
    TimeIota(i64),

    #[error("Validator.PubKeyTypes must not be empty")]
    NoPubKeyTypes,

    #[error("Validator.PubKeyTypes[{index}], {key_type}, is an unknown pubkey type")]
    UnknownPubKeyType { index: usize, key_type: String },
}

/// Invalid or unreadable genesis document
#[derive(Error, Debug)]
pub enum GenesisError {
    #[error("Genesis doc must include non-empty chain_id")]
    EmptyChainId,

    #[error("chain_id in genesis doc is too long (max: {max}, got: {got})")]
    LongChainId { max: usize, got: usize },

    #[error("Genesis doc must include genesis_time")]
    InvalidGenesisTime,

    #[error("Invalid consensus params: {0}")]
    InvalidConsensusParams(#[from] ParamsError),

    #[error("Genesis doc must include at least one validator")]
    NoValidators,

    #[error("Genesis validator #{index} cannot have zero voting power")]
    InvalidValidatorVotingPower { index: usize },

    #[error("Genesis validator #{index} has zero address")]
    InvalidValidatorAddress { index: usize },

    #[error("Genesis validator #{index} address does not match its public key")]
    ValidatorPubKeyMismatch { index: usize },

    #[error("Invalid genesis validator set: {0}")]
    ValidatorSet(#[from] ValidatorSetError),

    #[error("Genesis encoding error: {0}")]
    Encoding(#[from] CoreError),

    #[error("Failed to read or write genesis file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Genesis JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for validator set changes
pub type ValidatorSetResult<T> = Result<T, ValidatorSetError>;

/// Result type for commit verification
pub type CommitResult<T> = Result<T, CommitError>;

/// Result type for evidence checks
pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// Result type for consensus parameter checks
pub type ParamsResult<T> = Result<T, ParamsError>;

/// Result type for genesis operations
pub type GenesisResult<T> = Result<T, GenesisError>;
