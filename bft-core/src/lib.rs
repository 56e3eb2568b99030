//! Core BFT chain data structures
//!
//! This crate provides the building blocks shared by consensus and its callers:
//! - Basic types (Hash, Address, Height, Round)
//! - Hashing, Ed25519 keys and a simple Merkle tree
//! - Overflow-aware arithmetic for voting power
//! - Votes, commits and blocks with their stateless validation

pub mod block;
pub mod commit;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod safe_math;
pub mod types;
pub mod vote;

// Re-export commonly used types
pub use block::*;
pub use commit::*;
pub use crypto::{PrivKey, PubKey};
pub use error::*;
pub use types::*;
pub use vote::*;
