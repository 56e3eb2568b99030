//! Block data structures and operations

use crate::crypto::sum;
use crate::merkle::simple_hash_from_byte_slices;
use crate::vote::timestamp_parts;
use crate::{
    encode_to_vec, hex_bytes, Address, Commit, CoreError, CoreResult, Hash, Height,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Maximum length of a chain ID
pub const MAX_CHAIN_ID_LEN: usize = 50;

/// Block protocol version written by `Header::populate`
pub const BLOCK_VERSION: &str = "v1.0.0-rc.0";

/// Header of the part set a block is gossiped as
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    bincode::Encode,
)]
pub struct PartSetHeader {
    pub total: u32,
    pub hash: Option<Hash>,
}

impl PartSetHeader {
    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.hash.is_none()
    }
}

/// Identifies a block by its hash and part set header. The zero value
/// stands for "no block" (a vote on nil).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    bincode::Encode,
)]
pub struct BlockId {
    pub hash: Option<Hash>,
    pub parts: PartSetHeader,
}

impl BlockId {
    /// True for the ID of a nil block
    pub fn is_zero(&self) -> bool {
        self.hash.is_none() && self.parts.is_zero()
    }

    /// True for the ID of an actual block
    pub fn is_complete(&self) -> bool {
        self.hash.is_some() && self.parts.total > 0 && self.parts.hash.is_some()
    }

    /// A block ID must be either fully empty or fully populated
    pub fn validate_basic(&self) -> CoreResult<()> {
        if self.is_zero() || self.is_complete() {
            Ok(())
        } else {
            Err(CoreError::IncompleteBlockId)
        }
    }

    /// Byte key that orders and identifies block IDs
    pub fn key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(68);
        if let Some(hash) = &self.hash {
            key.extend_from_slice(hash.as_ref());
        }
        key.extend_from_slice(&self.parts.total.to_be_bytes());
        if let Some(hash) = &self.parts.hash {
            key.extend_from_slice(hash.as_ref());
        }
        key
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = |h: &Option<Hash>| match h {
            Some(h) => hex::encode_upper(&h.as_bytes()[..6]),
            None => String::new(),
        };
        write!(
            f,
            "{}:{}:{}",
            short(&self.hash),
            self.parts.total,
            short(&self.parts.hash)
        )
    }
}

/// An opaque transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode)]
pub struct Tx(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl Tx {
    pub fn hash(&self) -> Hash {
        sum(&self.0)
    }
}

impl From<&[u8]> for Tx {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Transactions carried by a block
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Data {
    txs: Vec<Tx>,
    #[serde(skip)]
    hash: OnceLock<Option<Hash>>,
}

impl Data {
    pub fn new(txs: Vec<Tx>) -> Self {
        Self {
            txs,
            hash: OnceLock::new(),
        }
    }

    pub fn txs(&self) -> &[Tx] {
        &self.txs
    }

    /// Mutable access to the transactions. Drops the memoized hash.
    pub fn txs_mut(&mut self) -> &mut Vec<Tx> {
        self.hash = OnceLock::new();
        &mut self.txs
    }

    /// Merkle root of the transaction hashes, computed once
    pub fn hash(&self) -> Option<Hash> {
        *self.hash.get_or_init(|| {
            let leaves: Vec<Hash> = self.txs.iter().map(Tx::hash).collect();
            simple_hash_from_byte_slices(&leaves)
        })
    }
}

impl Clone for Data {
    fn clone(&self) -> Self {
        Self {
            txs: self.txs.clone(),
            hash: self.hash.clone(),
        }
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        self.txs == other.txs
    }
}

impl Eq for Data {}

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    pub version: String,
    pub chain_id: String,
    pub height: Height,
    pub time: DateTime<Utc>,
    pub num_txs: i64,
    pub total_txs: i64,
    pub app_version: String,

    pub last_block_id: BlockId,

    /// Commit from validators of the previous block
    pub last_commit_hash: Option<Hash>,
    /// Transactions
    pub data_hash: Option<Hash>,

    /// Validators for the current block
    pub validators_hash: Option<Hash>,
    /// Validators for the next block
    pub next_validators_hash: Option<Hash>,
    /// Consensus params for the current block
    pub consensus_hash: Option<Hash>,
    /// State after the previous block's transactions, arbitrary length
    #[serde(with = "hex_bytes")]
    pub app_hash: Vec<u8>,
    /// Root of the previous block's transaction results
    pub last_results_hash: Option<Hash>,

    /// Original proposer of the block
    pub proposer_address: Address,
}

impl Header {
    /// Fill in the state-derived fields
    #[allow(clippy::too_many_arguments)]
    pub fn populate(
        &mut self,
        chain_id: impl Into<String>,
        time: DateTime<Utc>,
        last_block_id: BlockId,
        total_txs: i64,
        app_version: impl Into<String>,
        validators_hash: Option<Hash>,
        next_validators_hash: Option<Hash>,
        consensus_hash: Option<Hash>,
        app_hash: Vec<u8>,
        last_results_hash: Option<Hash>,
        proposer_address: Address,
    ) {
        self.version = BLOCK_VERSION.to_string();
        self.chain_id = chain_id.into();
        self.time = time;
        self.last_block_id = last_block_id;
        self.total_txs = total_txs;
        self.app_version = app_version.into();
        self.validators_hash = validators_hash;
        self.next_validators_hash = next_validators_hash;
        self.consensus_hash = consensus_hash;
        self.app_hash = app_hash;
        self.last_results_hash = last_results_hash;
        self.proposer_address = proposer_address;
    }

    /// Merkle root over the header fields in declaration order.
    ///
    /// Returns `None` while `validators_hash` is unset: a header is not
    /// hashable until it knows its validator set.
    pub fn hash(&self) -> CoreResult<Option<Hash>> {
        if self.validators_hash.is_none() {
            return Ok(None);
        }
        let fields = vec![
            encode_to_vec(&self.version)?,
            encode_to_vec(&self.chain_id)?,
            encode_to_vec(&self.height)?,
            encode_to_vec(&timestamp_parts(&self.time))?,
            encode_to_vec(&self.num_txs)?,
            encode_to_vec(&self.total_txs)?,
            encode_to_vec(&self.app_version)?,
            encode_to_vec(&self.last_block_id)?,
            encode_to_vec(&self.last_commit_hash)?,
            encode_to_vec(&self.data_hash)?,
            encode_to_vec(&self.validators_hash)?,
            encode_to_vec(&self.next_validators_hash)?,
            encode_to_vec(&self.consensus_hash)?,
            encode_to_vec(&self.app_hash)?,
            encode_to_vec(&self.last_results_hash)?,
            encode_to_vec(&self.proposer_address)?,
        ];
        Ok(simple_hash_from_byte_slices(&fields))
    }
}

/// The unit of the chain: header, transactions and the commit for the
/// previous block
#[derive(Debug, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    data: Data,
    last_commit: Option<Commit>,
    /// Memoized block hash; also serializes validation of this block
    #[serde(skip)]
    hash: Mutex<Option<Hash>>,
}

impl Block {
    /// Build a block whose header holds only what can be derived from the
    /// block itself. Complete it with `Header::populate`.
    pub fn new(height: Height, txs: Vec<Tx>, last_commit: Option<Commit>) -> CoreResult<Self> {
        let mut block = Self {
            header: Header {
                height,
                num_txs: txs.len() as i64,
                ..Header::default()
            },
            data: Data::new(txs),
            last_commit,
            hash: Mutex::new(None),
        };
        block.header.last_commit_hash = block.last_commit_hash()?;
        block.header.data_hash = block.data.hash();
        Ok(block)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Mutable header access. Drops the memoized block hash.
    pub fn header_mut(&mut self) -> &mut Header {
        *self.hash.get_mut() = None;
        &mut self.header
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Mutable data access. Drops the memoized block hash.
    pub fn data_mut(&mut self) -> &mut Data {
        *self.hash.get_mut() = None;
        &mut self.data
    }

    pub fn last_commit(&self) -> Option<&Commit> {
        self.last_commit.as_ref()
    }

    /// Mutable last-commit access. Drops the memoized block hash.
    pub fn last_commit_mut(&mut self) -> &mut Option<Commit> {
        *self.hash.get_mut() = None;
        &mut self.last_commit
    }

    fn last_commit_hash(&self) -> CoreResult<Option<Hash>> {
        match &self.last_commit {
            Some(commit) => commit.hash(),
            None => Ok(None),
        }
    }

    /// Stateless consistency checks of the block
    pub fn validate_basic(&self) -> CoreResult<()> {
        let _guard = self.hash.lock();
        let header = &self.header;

        if header.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(CoreError::ChainIdTooLong {
                max: MAX_CHAIN_ID_LEN,
                got: header.chain_id.len(),
            });
        }
        if header.height < 0 {
            return Err(CoreError::NegativeHeight(header.height));
        }
        if header.height == 0 {
            return Err(CoreError::ZeroHeight);
        }

        let num_txs = self.data.txs.len() as i64;
        if header.num_txs != num_txs {
            return Err(CoreError::NumTxsMismatch {
                expected: num_txs,
                got: header.num_txs,
            });
        }
        if header.total_txs < 0 {
            return Err(CoreError::NegativeTotalTxs(header.total_txs));
        }

        header
            .last_block_id
            .validate_basic()
            .map_err(|e| CoreError::InvalidLastBlockId(Box::new(e)))?;

        if header.height > 1 {
            let commit = self.last_commit.as_ref().ok_or(CoreError::MissingLastCommit)?;
            commit
                .validate_basic()
                .map_err(|e| CoreError::InvalidLastCommit(Box::new(e)))?;
        }
        if header.last_commit_hash != self.last_commit_hash()? {
            return Err(CoreError::LastCommitHashMismatch);
        }
        if header.data_hash != self.data.hash() {
            return Err(CoreError::DataHashMismatch);
        }
        // proposer_address is a fixed-size Address, so its length always holds
        Ok(())
    }

    /// Block hash, i.e. the header hash. `None` while the block has no last
    /// commit or its header is incomplete. Computed at most once until the
    /// block is mutated.
    pub fn hash(&self) -> CoreResult<Option<Hash>> {
        let mut memo = self.hash.lock();
        if let Some(hash) = *memo {
            return Ok(Some(hash));
        }
        if self.last_commit.is_none() {
            return Ok(None);
        }

        let mut header = self.header.clone();
        if header.last_commit_hash.is_none() {
            header.last_commit_hash = self.last_commit_hash()?;
        }
        if header.data_hash.is_none() {
            header.data_hash = self.data.hash();
        }
        let hash = header.hash()?;
        *memo = hash;
        Ok(hash)
    }

    /// True if the block hashes to `hash`
    pub fn hashes_to(&self, hash: &Hash) -> bool {
        matches!(self.hash(), Ok(Some(h)) if h == *hash)
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            header: self.header.clone(),
            data: self.data.clone(),
            last_commit: self.last_commit.clone(),
            hash: Mutex::new(*self.hash.lock()),
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.data == other.data
            && self.last_commit == other.last_commit
    }
}

/// A header together with the commit that proves it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedHeader {
    pub header: Header,
    pub commit: Commit,
}

impl SignedHeader {
    /// Check that the header and commit are consistent. Does not verify
    /// signatures; that needs the validator set.
    pub fn validate_basic(&self, chain_id: &str) -> CoreResult<()> {
        if self.header.chain_id != chain_id {
            return Err(CoreError::ChainIdMismatch {
                expected: chain_id.to_string(),
                got: self.header.chain_id.clone(),
            });
        }
        let commit_height = self.commit.height();
        if commit_height != self.header.height {
            return Err(CoreError::HeightMismatch {
                header: self.header.height,
                commit: commit_height,
            });
        }
        if self.header.hash()? != self.commit.block_id.hash {
            return Err(CoreError::BlockHashMismatch);
        }
        self.commit.validate_basic()
    }
}
