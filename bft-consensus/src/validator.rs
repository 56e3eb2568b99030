//! A single staked validator

use bft_core::{encode_to_vec, Address, CoreResult, PubKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Validator identity with its voting power and proposer priority.
///
/// A validator with `voting_power == 0` in a change set signals removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Derived from the public key
    pub address: Address,
    pub pub_key: PubKey,
    pub voting_power: i64,
    /// Accumulator driving proposer rotation
    pub proposer_priority: i64,
}

impl Validator {
    /// Create a validator with zero proposer priority
    pub fn new(pub_key: PubKey, voting_power: i64) -> Self {
        Self {
            address: pub_key.address(),
            pub_key,
            voting_power,
            proposer_priority: 0,
        }
    }

    /// Proposer order of `self` against `other`: `Greater` when `self`
    /// should propose first. Higher priority wins, then the lower address.
    ///
    /// Panics if both have the same address and priority.
    pub fn compare_proposer_priority(&self, other: &Validator) -> Ordering {
        match self.proposer_priority.cmp(&other.proposer_priority) {
            Ordering::Equal => match other.address.cmp(&self.address) {
                Ordering::Equal => panic!("Cannot compare identical validators"),
                by_address => by_address,
            },
            by_priority => by_priority,
        }
    }

    /// Encoding used as the Merkle leaf of the validator set hash. Only the
    /// public key and voting power are covered; the priority changes every
    /// round.
    pub fn bytes(&self) -> CoreResult<Vec<u8>> {
        encode_to_vec(&(self.pub_key, self.voting_power))
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validator{{{} {} VP:{} A:{}}}",
            self.address, self.pub_key, self.voting_power, self.proposer_priority
        )
    }
}
