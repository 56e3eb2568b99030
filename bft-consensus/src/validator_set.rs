//! Validator set with weighted round-robin proposer rotation
//!
//! Validators are kept sorted by address, so their indices are fixed for
//! every round of a height and line up with the precommit slots of a commit.
//! Proposer priorities change every round; `increment_proposer_priority`
//! advances them and picks the proposer in proportion to voting power.
//!
//! The set is a plain value. Whoever owns it mutates it; readers that need a
//! stable view take a clone.

use crate::error::{CommitError, CommitResult, ValidatorSetError, ValidatorSetResult};
use crate::validator::Validator;
use bft_core::merkle::simple_hash_from_byte_slices;
use bft_core::safe_math::{safe_add_clip, safe_sub_clip};
use bft_core::{Address, BlockId, Commit, CoreError, CoreResult, Hash, Height, SignedMsgType};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Upper bound on the total voting power of a set. Small enough that
/// priority arithmetic never clips and `diff + diff_max - 1` in rescaling
/// cannot overflow.
pub const MAX_TOTAL_VOTING_POWER: i64 = i64::MAX / 8;

/// Multiplied by the total voting power, gives the maximum allowed distance
/// between the highest and lowest proposer priority
pub const PRIORITY_WINDOW_SIZE_FACTOR: i64 = 2;

/// Validators of one height, sorted by address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    /// Address of the current proposer
    proposer: Option<Address>,
    total_voting_power: i64,
}

impl ValidatorSet {
    /// Build a set from `validators` and select the first proposer.
    ///
    /// Zero voting power is rejected here since there is nothing to remove.
    /// An empty list gives an empty set.
    pub fn new(validators: Vec<Validator>) -> ValidatorSetResult<Self> {
        let mut set = Self::default();
        set.update_with_change_set_inner(&validators, false)?;
        if !validators.is_empty() {
            set.increment_proposer_priority(1);
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn size(&self) -> usize {
        self.validators.len()
    }

    /// Validators in address order
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Iterate over the validators with their indices, in address order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Validator)> {
        self.validators.iter().enumerate()
    }

    pub fn total_voting_power(&self) -> i64 {
        self.total_voting_power
    }

    fn index_of(&self, address: &Address) -> Option<usize> {
        self.validators
            .binary_search_by(|v| v.address.cmp(address))
            .ok()
    }

    pub fn has_address(&self, address: &Address) -> bool {
        self.index_of(address).is_some()
    }

    /// Index and a copy of the validator with `address`
    pub fn get_by_address(&self, address: &Address) -> Option<(usize, Validator)> {
        let index = self.index_of(address)?;
        Some((index, self.validators[index].clone()))
    }

    /// Copy of the validator at `index`
    pub fn get_by_index(&self, index: usize) -> Option<Validator> {
        self.validators.get(index).cloned()
    }

    /// Current proposer, or `None` for an empty set. Falls back to the
    /// validator with the highest priority when no proposer was selected yet.
    pub fn get_proposer(&self) -> Option<Validator> {
        if let Some(index) = self.proposer.and_then(|addr| self.index_of(&addr)) {
            return Some(self.validators[index].clone());
        }
        self.most_priority_index()
            .map(|index| self.validators[index].clone())
    }

    /// Merkle root over the validators, `None` for an empty set
    pub fn hash(&self) -> CoreResult<Option<Hash>> {
        let leaves = self
            .validators
            .iter()
            .map(Validator::bytes)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(simple_hash_from_byte_slices(&leaves))
    }

    /// Increment priorities on a copy and return it
    pub fn copy_increment_proposer_priority(&self, times: u32) -> Self {
        let mut copy = self.clone();
        copy.increment_proposer_priority(times);
        copy
    }

    /// Run `times` rounds of proposer selection.
    ///
    /// Panics on an empty set or when `times` is zero.
    pub fn increment_proposer_priority(&mut self, times: u32) {
        assert!(!self.is_empty(), "empty validator set");
        assert!(
            times > 0,
            "Cannot call increment_proposer_priority with non-positive times"
        );

        // Keep max - min priority within a window proportional to the total
        let diff_max = PRIORITY_WINDOW_SIZE_FACTOR * self.total_voting_power;
        self.rescale_priorities(diff_max);
        self.shift_by_avg_proposer_priority();

        let mut proposer = self.increment_once();
        for _ in 1..times {
            proposer = self.increment_once();
        }
        debug!("Selected proposer {} after {} round(s)", proposer, times);
        self.proposer = Some(proposer);
    }

    fn increment_once(&mut self) -> Address {
        for val in &mut self.validators {
            val.proposer_priority = safe_add_clip(val.proposer_priority, val.voting_power);
        }
        let total = self.total_voting_power;
        // Non-empty, checked by the caller
        let index = self.most_priority_index().unwrap_or_default();
        let mostest = &mut self.validators[index];
        mostest.proposer_priority = safe_sub_clip(mostest.proposer_priority, total);
        mostest.address
    }

    fn most_priority_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, val) in self.validators.iter().enumerate() {
            let wins = match best {
                None => true,
                Some(b) => val.compare_proposer_priority(&self.validators[b]) == Ordering::Greater,
            };
            if wins {
                best = Some(i);
            }
        }
        best
    }

    /// Divide all priorities by `ceil(diff / diff_max)` when the distance
    /// between the highest and lowest priority exceeds `diff_max`.
    ///
    /// Panics on an empty set. A non-positive `diff_max` is a no-op.
    pub fn rescale_priorities(&mut self, diff_max: i64) {
        assert!(!self.is_empty(), "empty validator set");
        if diff_max <= 0 {
            return;
        }

        let diff = self.max_min_priority_diff();
        let diff_max = diff_max as i128;
        if diff > diff_max {
            let ratio = (diff + diff_max - 1) / diff_max;
            for val in &mut self.validators {
                val.proposer_priority = (val.proposer_priority as i128 / ratio) as i64;
            }
        }
    }

    fn max_min_priority_diff(&self) -> i128 {
        let priorities = self.validators.iter().map(|v| v.proposer_priority);
        let max = priorities.clone().max().unwrap_or(0) as i128;
        let min = priorities.min().unwrap_or(0) as i128;
        max - min
    }

    fn avg_proposer_priority(&self) -> i64 {
        let n = self.validators.len() as i128;
        let sum: i128 = self
            .validators
            .iter()
            .map(|v| v.proposer_priority as i128)
            .sum();
        let avg = sum.div_euclid(n);
        i64::try_from(avg).unwrap_or_else(|_| {
            panic!("Cannot represent avg ProposerPriority as an i64: {}", avg)
        })
    }

    fn shift_by_avg_proposer_priority(&mut self) {
        assert!(!self.is_empty(), "empty validator set");
        let avg = self.avg_proposer_priority();
        for val in &mut self.validators {
            val.proposer_priority = safe_sub_clip(val.proposer_priority, avg);
        }
    }

    fn update_total_voting_power(&mut self) {
        let mut sum = 0i64;
        for val in &self.validators {
            sum = safe_add_clip(sum, val.voting_power);
            assert!(
                sum <= MAX_TOTAL_VOTING_POWER,
                "Total voting power should be guarded to not exceed {}; got: {}",
                MAX_TOTAL_VOTING_POWER,
                sum
            );
        }
        self.total_voting_power = sum;
    }

    /// Apply a batch of validator additions, updates and removals.
    ///
    /// A change with zero voting power removes the validator. Changes are
    /// checked as a whole before anything is applied, so on error the set is
    /// left untouched. New validators start with a priority of about
    /// -1.125 times the new total, so leaving and rejoining cannot reset a
    /// priority deficit.
    pub fn update_with_change_set(&mut self, changes: &[Validator]) -> ValidatorSetResult<()> {
        self.update_with_change_set_inner(changes, true)
    }

    fn update_with_change_set_inner(
        &mut self,
        changes: &[Validator],
        allow_deletes: bool,
    ) -> ValidatorSetResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        for change in changes {
            if change.address.is_zero() {
                return Err(ValidatorSetError::ZeroAddress);
            }
            if change.address != change.pub_key.address() {
                return Err(ValidatorSetError::AddressMismatch {
                    address: change.address,
                });
            }
        }

        let (mut updates, removals) = process_changes(changes)?;
        if !allow_deletes && !removals.is_empty() {
            return Err(ValidatorSetError::RemovalsNotAllowed);
        }

        self.verify_removals(&removals)?;
        let (updated_total, num_new) = self.verify_updates(&updates)?;

        if num_new == 0 && self.validators.len() == removals.len() {
            return Err(ValidatorSetError::ResultingSetEmpty);
        }

        self.compute_new_priorities(&mut updates, updated_total);

        let num_updates = updates.len();
        self.apply_updates(updates);
        self.apply_removals(&removals);
        self.update_total_voting_power();

        self.rescale_priorities(PRIORITY_WINDOW_SIZE_FACTOR * self.total_voting_power);
        self.shift_by_avg_proposer_priority();

        debug!(
            "Applied validator changes: {} update(s), {} removal(s), {} new; total voting power {}",
            num_updates,
            removals.len(),
            num_new,
            self.total_voting_power
        );
        Ok(())
    }

    /// Check the running total stays under the cap. Only updates are
    /// counted; removals are applied after this check.
    fn verify_updates(&self, updates: &[Validator]) -> ValidatorSetResult<(i64, usize)> {
        let mut updated_total = self.total_voting_power;
        let mut num_new = 0;

        for update in updates {
            match self.get_by_address(&update.address) {
                None => {
                    updated_total = safe_add_clip(updated_total, update.voting_power);
                    num_new += 1;
                }
                Some((_, val)) => {
                    let delta = safe_sub_clip(update.voting_power, val.voting_power);
                    updated_total = safe_add_clip(updated_total, delta);
                }
            }
            if updated_total > MAX_TOTAL_VOTING_POWER {
                return Err(ValidatorSetError::ExceedsMaxTotalVotingPower {
                    max: MAX_TOTAL_VOTING_POWER,
                });
            }
        }
        Ok((updated_total, num_new))
    }

    fn compute_new_priorities(&self, updates: &mut [Validator], updated_total: i64) {
        for update in updates {
            update.proposer_priority = match self.get_by_address(&update.address) {
                // Roughly -1.125 * total, cannot overflow below the cap
                None => -(updated_total + (updated_total >> 3)),
                Some((_, val)) => val.proposer_priority,
            };
        }
    }

    /// Merge sorted `updates` into the sorted validator list. On equal
    /// addresses the update replaces the existing entry.
    fn apply_updates(&mut self, updates: Vec<Validator>) {
        let existing = std::mem::take(&mut self.validators);
        let mut merged = Vec::with_capacity(existing.len() + updates.len());
        let mut existing = existing.into_iter().peekable();
        let mut updates = updates.into_iter().peekable();

        while let (Some(e), Some(u)) = (existing.peek(), updates.peek()) {
            match e.address.cmp(&u.address) {
                Ordering::Less => merged.extend(existing.next()),
                Ordering::Equal => {
                    existing.next();
                    merged.extend(updates.next());
                }
                Ordering::Greater => merged.extend(updates.next()),
            }
        }
        merged.extend(existing);
        merged.extend(updates);
        self.validators = merged;
    }

    fn verify_removals(&self, removals: &[Validator]) -> ValidatorSetResult<()> {
        for removal in removals {
            if !self.has_address(&removal.address) {
                return Err(ValidatorSetError::UnknownValidatorToRemove {
                    address: removal.address,
                });
            }
        }
        assert!(
            removals.len() <= self.validators.len(),
            "more deletes than validators"
        );
        Ok(())
    }

    fn apply_removals(&mut self, removals: &[Validator]) {
        self.validators.retain(|val| {
            removals
                .binary_search_by(|r| r.address.cmp(&val.address))
                .is_err()
        });
    }

    /// Check that more than two thirds of this set's voting power signed
    /// `block_id` at `height` in `commit`.
    ///
    /// Precommits for other blocks are still signature checked but do not
    /// count towards the tally.
    pub fn verify_commit(
        &self,
        chain_id: &str,
        block_id: &BlockId,
        height: Height,
        commit: &Commit,
    ) -> CommitResult<()> {
        commit.validate_basic()?;
        if self.size() != commit.size() {
            return Err(CommitError::PrecommitCount {
                expected: self.size(),
                got: commit.size(),
            });
        }
        if height != commit.height() {
            return Err(CommitError::Height {
                expected: height,
                got: commit.height(),
            });
        }
        if *block_id != commit.block_id {
            return Err(CommitError::WrongBlockId);
        }

        let mut tallied: i64 = 0;
        for (index, precommit) in commit.precommits().iter().enumerate() {
            let Some(precommit) = precommit else {
                continue;
            };
            // Sizes match, so every slot has a validator
            let val = &self.validators[index];
            if !verify_precommit(commit, chain_id, index, val)? {
                warn!("Invalid signature on precommit #{} from {}", index, val.address);
                return Err(CommitError::InvalidSignature {
                    index,
                    source: CoreError::InvalidSignature,
                });
            }
            if precommit.block_id == *block_id {
                tallied = safe_add_clip(tallied, val.voting_power);
            }
        }

        let threshold = self.total_voting_power * 2 / 3;
        if tallied > threshold {
            debug!(
                "Commit for height {} verified with {} of {} voting power",
                height, tallied, self.total_voting_power
            );
            Ok(())
        } else {
            warn!(
                "Commit for height {} has insufficient voting power: {} of {}",
                height, tallied, self.total_voting_power
            );
            Err(CommitError::TooMuchChange {
                got: tallied,
                needed: threshold + 1,
            })
        }
    }

    /// Check that `commit` is valid for `new_set` and that validators of
    /// this (older) set holding more than two thirds of its voting power
    /// also signed it.
    ///
    /// Lets a light client move trust from this set to `new_set`. Does not
    /// check that `height` is actually in the future.
    pub fn verify_future_commit(
        &self,
        new_set: &ValidatorSet,
        chain_id: &str,
        block_id: &BlockId,
        height: Height,
        commit: &Commit,
    ) -> CommitResult<()> {
        new_set.verify_commit(chain_id, block_id, height, commit)?;

        let round = commit.round();
        let mut old_voting_power: i64 = 0;
        let mut seen = HashSet::new();

        for (index, precommit) in commit.precommits().iter().enumerate() {
            let Some(precommit) = precommit else {
                continue;
            };
            if precommit.height != height {
                return Err(CommitError::PrecommitHeight {
                    index,
                    expected: height,
                    got: precommit.height,
                });
            }
            if precommit.round != round {
                return Err(CommitError::PrecommitRound {
                    index,
                    expected: round,
                    got: precommit.round,
                });
            }
            if precommit.vote_type != SignedMsgType::Precommit {
                return Err(CommitError::PrecommitType {
                    index,
                    got: precommit.vote_type,
                });
            }

            // Skip signers unknown to the old set and repeated votes
            let Some((old_index, val)) = self.get_by_address(&precommit.validator_address) else {
                continue;
            };
            if !seen.insert(old_index) {
                continue;
            }

            if !verify_precommit(commit, chain_id, index, &val)? {
                warn!("Invalid signature on precommit #{} from {}", index, val.address);
                return Err(CommitError::InvalidSignature {
                    index,
                    source: CoreError::InvalidSignature,
                });
            }
            if precommit.block_id == *block_id {
                old_voting_power = safe_add_clip(old_voting_power, val.voting_power);
            }
        }

        let threshold = self.total_voting_power * 2 / 3;
        if old_voting_power <= threshold {
            warn!(
                "Future commit at height {} signed by only {} of {} old voting power",
                height, old_voting_power, self.total_voting_power
            );
            return Err(CommitError::TooMuchChange {
                got: old_voting_power,
                needed: threshold + 1,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ValidatorSet{{")?;
        match self.get_proposer() {
            Some(proposer) => writeln!(f, "  Proposer: {}", proposer)?,
            None => writeln!(f, "  Proposer: nil")?,
        }
        writeln!(f, "  Validators:")?;
        for val in &self.validators {
            writeln!(f, "    {}", val)?;
        }
        write!(f, "}}")
    }
}

/// Verify the signature of the precommit in slot `index` with `val`'s key
fn verify_precommit(
    commit: &Commit,
    chain_id: &str,
    index: usize,
    val: &Validator,
) -> CommitResult<bool> {
    let Some(sign_bytes) = commit.vote_sign_bytes(chain_id, index)? else {
        return Ok(false);
    };
    let signature = commit.precommits()[index]
        .as_ref()
        .map(|p| p.signature.as_slice())
        .unwrap_or_default();
    Ok(val.pub_key.verify_bytes(&sign_bytes, signature))
}

/// Sort changes by address and split them into updates and removals,
/// rejecting duplicates and out-of-range voting power
fn process_changes(changes: &[Validator]) -> ValidatorSetResult<(Vec<Validator>, Vec<Validator>)> {
    let mut changes = changes.to_vec();
    changes.sort_by(|a, b| a.address.cmp(&b.address));

    let mut updates = Vec::with_capacity(changes.len());
    let mut removals = Vec::new();
    let mut prev: Option<Address> = None;

    for change in changes {
        if prev == Some(change.address) {
            return Err(ValidatorSetError::DuplicateEntry {
                address: change.address,
            });
        }
        if change.voting_power < 0 {
            return Err(ValidatorSetError::NegativeVotingPower {
                address: change.address,
                power: change.voting_power,
            });
        }
        if change.voting_power > MAX_TOTAL_VOTING_POWER {
            return Err(ValidatorSetError::VotingPowerTooHigh {
                address: change.address,
                power: change.voting_power,
                max: MAX_TOTAL_VOTING_POWER,
            });
        }
        prev = Some(change.address);
        if change.voting_power == 0 {
            removals.push(change);
        } else {
            updates.push(change);
        }
    }
    Ok((updates, removals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{make_commit, rand_validator, rand_validator_set, TEST_CHAIN_ID};
    use bft_core::PrivKey;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn priorities(set: &ValidatorSet) -> Vec<i64> {
        set.validators().iter().map(|v| v.proposer_priority).collect()
    }

    #[test]
    fn test_new_empty() {
        let set = ValidatorSet::new(Vec::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.total_voting_power(), 0);
        assert!(set.get_proposer().is_none());
        assert_eq!(set.hash().unwrap(), None);
    }

    #[test]
    fn test_new_sorts_and_selects_proposer() {
        let (set, _) = rand_validator_set(4, 1);
        assert_eq!(set.size(), 4);
        assert_eq!(set.total_voting_power(), 4);
        assert!(set
            .validators()
            .windows(2)
            .all(|w| w[0].address < w[1].address));

        assert_eq!(priorities(&set), vec![-3, 1, 1, 1]);
        assert_eq!(set.get_proposer().unwrap().address, set.validators()[0].address);
    }

    #[test]
    fn test_new_rejects_zero_power() {
        let zero = rand_validator(0);
        assert_eq!(
            ValidatorSet::new(vec![rand_validator(1), zero]),
            Err(ValidatorSetError::RemovalsNotAllowed)
        );
    }

    #[test]
    fn test_lookups() {
        let (set, _) = rand_validator_set(3, 10);
        let second = set.validators()[1].clone();

        assert!(set.has_address(&second.address));
        assert_eq!(set.get_by_address(&second.address), Some((1, second.clone())));
        assert_eq!(set.get_by_index(1), Some(second));
        assert_eq!(set.get_by_index(3), None);

        let outsider = rand_validator(10);
        assert!(!set.has_address(&outsider.address));
        assert_eq!(set.get_by_address(&outsider.address), None);
    }

    #[test]
    fn test_hash_ignores_priorities() {
        let (set, _) = rand_validator_set(3, 10);
        let hash = set.hash().unwrap();
        assert!(hash.is_some());
        assert_eq!(set.copy_increment_proposer_priority(5).hash().unwrap(), hash);
    }

    #[test]
    fn test_round_robin_equal_power() {
        let (mut set, _) = rand_validator_set(4, 1);
        let addresses: Vec<Address> = set.validators().iter().map(|v| v.address).collect();

        let mut proposers = Vec::new();
        for _ in 0..8 {
            set.increment_proposer_priority(1);
            proposers.push(set.get_proposer().unwrap().address);
        }
        let expected: Vec<Address> = [1, 2, 3, 0, 1, 2, 3, 0]
            .iter()
            .map(|&i| addresses[i])
            .collect();
        assert_eq!(proposers, expected);
    }

    #[test]
    fn test_each_proposes_once_per_cycle() {
        let (mut set, _) = rand_validator_set(7, 5);
        let mut seen = HashSet::new();
        for _ in 0..7 {
            set.increment_proposer_priority(1);
            seen.insert(set.get_proposer().unwrap().address);
        }
        assert_eq!(seen.len(), 7);
    }

    fn proposer_counts(powers: &[i64], rounds: usize) -> HashMap<Address, i64> {
        let vals: Vec<Validator> = powers
            .iter()
            .enumerate()
            .map(|(i, &p)| Validator::new(PrivKey::from_seed([i as u8 + 1; 32]).pub_key(), p))
            .collect();
        let mut set = ValidatorSet::new(vals).unwrap();

        let mut counts = HashMap::new();
        *counts.entry(set.get_proposer().unwrap().address).or_insert(0) += 1;
        for _ in 1..rounds {
            set.increment_proposer_priority(1);
            *counts.entry(set.get_proposer().unwrap().address).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_proposer_frequency_matches_power() {
        for powers in [vec![10, 1, 1], vec![1000, 300, 330], vec![1, 2, 3, 4]] {
            let rounds: i64 = powers.iter().sum();
            let counts = proposer_counts(&powers, rounds as usize);
            for (i, &power) in powers.iter().enumerate() {
                let addr = PrivKey::from_seed([i as u8 + 1; 32]).pub_key().address();
                assert_eq!(counts.get(&addr).copied().unwrap_or(0), power);
            }
        }
    }

    #[test]
    fn test_increment_times() {
        let (set, _) = rand_validator_set(5, 3);
        let mut stepped = set.clone();
        for _ in 0..4 {
            stepped.increment_proposer_priority(1);
        }
        let jumped = set.copy_increment_proposer_priority(4);
        assert_eq!(jumped, stepped);
        assert_ne!(jumped, set);
    }

    #[test]
    #[should_panic(expected = "empty validator set")]
    fn test_increment_empty_panics() {
        ValidatorSet::default().increment_proposer_priority(1);
    }

    #[test]
    #[should_panic(expected = "non-positive times")]
    fn test_increment_zero_times_panics() {
        let (mut set, _) = rand_validator_set(2, 1);
        set.increment_proposer_priority(0);
    }

    #[test]
    fn test_rescale_priorities() {
        let (mut set, _) = rand_validator_set(2, 1);
        set.validators[0].proposer_priority = 100;
        set.validators[1].proposer_priority = -7;

        // diff 107, window 10 -> ratio 11, truncating toward zero
        set.rescale_priorities(10);
        assert_eq!(priorities(&set), vec![9, 0]);

        // within the window: unchanged
        set.rescale_priorities(10);
        assert_eq!(priorities(&set), vec![9, 0]);

        set.rescale_priorities(0);
        assert_eq!(priorities(&set), vec![9, 0]);
    }

    #[test]
    fn test_average_uses_floor_division() {
        let (mut set, _) = rand_validator_set(3, 1);
        set.validators[0].proposer_priority = -22;
        set.validators[1].proposer_priority = 0;
        set.validators[2].proposer_priority = 0;
        assert_eq!(set.avg_proposer_priority(), -8);
    }

    #[test]
    fn test_new_validator_starts_behind() {
        let (mut set, _) = rand_validator_set(2, 5);
        assert_eq!(priorities(&set).iter().sum::<i64>(), 0);
        let proposer = set.get_proposer().unwrap();
        let other = set
            .validators()
            .iter()
            .find(|v| v.address != proposer.address)
            .cloned()
            .unwrap();
        assert_eq!(proposer.proposer_priority, -5);
        assert_eq!(other.proposer_priority, 5);

        let newcomer = rand_validator(10);
        set.update_with_change_set(&[newcomer.clone()]).unwrap();

        assert_eq!(set.total_voting_power(), 20);
        let prio = |addr: &Address| set.get_by_address(addr).unwrap().1.proposer_priority;
        // -(20 + 20/8) = -22 before centering, then shifted by floor(-22/3) = -8
        assert_eq!(prio(&newcomer.address), -14);
        assert_eq!(prio(&proposer.address), 3);
        assert_eq!(prio(&other.address), 13);
    }

    #[test]
    fn test_lowering_power_reduces_total() {
        let (mut set, _) = rand_validator_set(3, 10);
        let mut target = set.validators()[0].clone();
        target.voting_power = 1;

        set.update_with_change_set(&[target]).unwrap();
        assert_eq!(set.total_voting_power(), 21);
        assert_eq!(set.validators()[0].voting_power, 1);

        // Shrinking a validator frees room under the cap for a newcomer
        let (mut set, _) = rand_validator_set(2, MAX_TOTAL_VOTING_POWER / 2);
        let mut shrunk = set.validators()[0].clone();
        shrunk.voting_power = 1;
        set.update_with_change_set(&[shrunk]).unwrap();
        let newcomer = rand_validator(MAX_TOTAL_VOTING_POWER / 4);
        set.update_with_change_set(&[newcomer]).unwrap();
        assert_eq!(
            set.total_voting_power(),
            MAX_TOTAL_VOTING_POWER / 2 + 1 + MAX_TOTAL_VOTING_POWER / 4
        );
    }

    #[test]
    fn test_display_and_iter() {
        let (set, _) = rand_validator_set(3, 10);
        let shown = set.to_string();
        let proposer = set.get_proposer().unwrap();

        assert!(shown.starts_with("ValidatorSet{"));
        assert!(shown.contains(&format!("Proposer: {}", proposer)));
        for (i, val) in set.iter() {
            assert_eq!(set.get_by_index(i).as_ref(), Some(val));
            assert!(shown.contains(&format!("    {}", val)));
        }
        assert_eq!(set.iter().count(), 3);
        assert_eq!(ValidatorSet::default().to_string().lines().nth(1), Some("  Proposer: nil"));
    }

    #[test]
    fn test_update_existing_keeps_priority() {
        let (mut set, _) = rand_validator_set(3, 10);
        let mut target = set.validators()[2].clone();
        let before = priorities(&set);
        target.voting_power = 20;
        target.proposer_priority = 12345;

        set.update_with_change_set(&[target.clone()]).unwrap();
        assert_eq!(set.total_voting_power(), 40);
        assert_eq!(set.validators()[2].voting_power, 20);
        // priorities kept; the sum was already zero so centering is a no-op
        assert_eq!(priorities(&set), before);
    }

    #[test]
    fn test_removal() {
        let (mut set, _) = rand_validator_set(3, 10);
        let mut removed = set.validators()[1].clone();
        removed.voting_power = 0;

        set.update_with_change_set(&[removed.clone()]).unwrap();
        assert_eq!(set.size(), 2);
        assert_eq!(set.total_voting_power(), 20);
        assert!(!set.has_address(&removed.address));
        assert_ne!(set.get_proposer().unwrap().address, removed.address);
    }

    #[test]
    fn test_change_set_errors_leave_set_untouched() {
        let (mut set, _) = rand_validator_set(3, 10);
        let original = set.clone();
        let newcomer = rand_validator(5);

        let mut zero_addr = newcomer.clone();
        zero_addr.address = Address::zero();
        assert_eq!(
            set.update_with_change_set(&[zero_addr]),
            Err(ValidatorSetError::ZeroAddress)
        );

        let mut wrong_addr = newcomer.clone();
        wrong_addr.address = set.validators()[0].address;
        assert_eq!(
            set.update_with_change_set(&[wrong_addr.clone()]),
            Err(ValidatorSetError::AddressMismatch {
                address: wrong_addr.address
            })
        );

        assert_eq!(
            set.update_with_change_set(&[newcomer.clone(), newcomer.clone()]),
            Err(ValidatorSetError::DuplicateEntry {
                address: newcomer.address
            })
        );

        let mut negative = newcomer.clone();
        negative.voting_power = -1;
        assert!(matches!(
            set.update_with_change_set(&[negative]),
            Err(ValidatorSetError::NegativeVotingPower { power: -1, .. })
        ));

        let mut huge = newcomer.clone();
        huge.voting_power = MAX_TOTAL_VOTING_POWER + 1;
        assert!(matches!(
            set.update_with_change_set(&[huge]),
            Err(ValidatorSetError::VotingPowerTooHigh { .. })
        ));

        let mut at_cap = newcomer.clone();
        at_cap.voting_power = MAX_TOTAL_VOTING_POWER;
        assert_eq!(
            set.update_with_change_set(&[at_cap]),
            Err(ValidatorSetError::ExceedsMaxTotalVotingPower {
                max: MAX_TOTAL_VOTING_POWER
            })
        );

        let mut unknown = newcomer.clone();
        unknown.voting_power = 0;
        assert_eq!(
            set.update_with_change_set(&[unknown]),
            Err(ValidatorSetError::UnknownValidatorToRemove {
                address: newcomer.address
            })
        );

        let remove_all: Vec<Validator> = set
            .validators()
            .iter()
            .map(|v| Validator {
                voting_power: 0,
                ..v.clone()
            })
            .collect();
        assert_eq!(
            set.update_with_change_set(&remove_all),
            Err(ValidatorSetError::ResultingSetEmpty)
        );

        assert_eq!(set, original);
    }

    #[test]
    fn test_removals_do_not_offset_cap() {
        let (mut set, _) = rand_validator_set(2, MAX_TOTAL_VOTING_POWER / 2);
        let mut removed = set.validators()[0].clone();
        removed.voting_power = 0;
        let newcomer = rand_validator(MAX_TOTAL_VOTING_POWER / 2);

        assert_eq!(
            set.update_with_change_set(&[removed, newcomer]),
            Err(ValidatorSetError::ExceedsMaxTotalVotingPower {
                max: MAX_TOTAL_VOTING_POWER
            })
        );
    }

    #[test]
    fn test_verify_commit_quorum() {
        let (set, keys) = rand_validator_set(10, 1);
        let block_id = crate::test_util::block_id(b"block");

        let commit = make_commit(&set, &keys, &block_id, 5, 0, 6);
        assert_eq!(
            set.verify_commit(TEST_CHAIN_ID, &block_id, 5, &commit),
            Err(CommitError::TooMuchChange { got: 6, needed: 7 })
        );

        let commit = make_commit(&set, &keys, &block_id, 5, 0, 7);
        assert_eq!(set.verify_commit(TEST_CHAIN_ID, &block_id, 5, &commit), Ok(()));
    }

    #[test]
    fn test_verify_commit_errors() {
        let (set, keys) = rand_validator_set(4, 10);
        let block_id = crate::test_util::block_id(b"block");
        let commit = make_commit(&set, &keys, &block_id, 5, 1, 4);

        assert_eq!(
            set.verify_commit(TEST_CHAIN_ID, &block_id, 6, &commit),
            Err(CommitError::Height { expected: 6, got: 5 })
        );
        let other_id = crate::test_util::block_id(b"other");
        assert_eq!(
            set.verify_commit(TEST_CHAIN_ID, &other_id, 5, &commit),
            Err(CommitError::WrongBlockId)
        );
        assert!(matches!(
            set.verify_commit("another-chain", &block_id, 5, &commit),
            Err(CommitError::InvalidSignature { index: 0, .. })
        ));

        let (bigger, _) = rand_validator_set(5, 10);
        assert_eq!(
            bigger.verify_commit(TEST_CHAIN_ID, &block_id, 5, &commit),
            Err(CommitError::PrecommitCount { expected: 5, got: 4 })
        );

        let nil_commit = Commit::new(BlockId::default(), commit.precommits().to_vec());
        assert_eq!(
            set.verify_commit(TEST_CHAIN_ID, &block_id, 5, &nil_commit),
            Err(CommitError::Invalid(CoreError::CommitForNilBlock))
        );
    }

    #[test]
    fn test_verify_commit_stray_precommits() {
        let (set, keys) = rand_validator_set(4, 10);
        let block_id = crate::test_util::block_id(b"block");
        let other_id = crate::test_util::block_id(b"other");

        // Three for the block, one validly signed for another block
        let mut commit = make_commit(&set, &keys, &block_id, 5, 0, 3);
        let stray = make_commit(&set, &keys, &other_id, 5, 0, 4);
        commit.precommits_mut()[3] = stray.precommits()[3].clone();
        assert_eq!(set.verify_commit(TEST_CHAIN_ID, &block_id, 5, &commit), Ok(()));

        // Two for the block is not enough, stray votes do not count
        commit.precommits_mut()[2] = stray.precommits()[2].clone();
        assert_eq!(
            set.verify_commit(TEST_CHAIN_ID, &block_id, 5, &commit),
            Err(CommitError::TooMuchChange { got: 20, needed: 27 })
        );
    }

    #[test]
    fn test_verify_future_commit() {
        let (old_set, old_keys) = rand_validator_set(4, 10);
        let block_id = crate::test_util::block_id(b"block");

        // New set keeps the first three old validators and adds one
        let newcomer_key = PrivKey::generate();
        let mut new_vals: Vec<Validator> = old_set.validators()[..3].to_vec();
        new_vals.push(Validator::new(newcomer_key.pub_key(), 10));
        let new_set = ValidatorSet::new(new_vals).unwrap();
        let new_keys: Vec<PrivKey> = new_set
            .validators()
            .iter()
            .map(|v| {
                old_keys
                    .iter()
                    .chain(std::iter::once(&newcomer_key))
                    .find(|k| k.pub_key().address() == v.address)
                    .cloned()
                    .unwrap()
            })
            .collect();

        let commit = make_commit(&new_set, &new_keys, &block_id, 9, 0, 4);
        assert_eq!(
            old_set.verify_future_commit(&new_set, TEST_CHAIN_ID, &block_id, 9, &commit),
            Ok(())
        );

        // Only two old validators sign: fine for the new set, not for the old
        let mut commit = make_commit(&new_set, &new_keys, &block_id, 9, 0, 4);
        let mut dropped = 0;
        for (i, val) in new_set.validators().iter().enumerate() {
            if val.address != newcomer_key.pub_key().address() && dropped < 1 {
                commit.precommits_mut()[i] = None;
                dropped += 1;
            }
        }
        assert_eq!(new_set.verify_commit(TEST_CHAIN_ID, &block_id, 9, &commit), Ok(()));
        assert_eq!(
            old_set.verify_future_commit(&new_set, TEST_CHAIN_ID, &block_id, 9, &commit),
            Err(CommitError::TooMuchChange { got: 20, needed: 27 })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_updates_keep_set_sorted_and_capped(
            initial in prop::collection::vec(1i64..1_000, 1..6),
            changes in prop::collection::vec((0u8..12, 0i64..1_000), 0..8),
        ) {
            let keys: Vec<PrivKey> = (0..12u8).map(|i| PrivKey::from_seed([i + 1; 32])).collect();
            let vals: Vec<Validator> = initial
                .iter()
                .enumerate()
                .map(|(i, &p)| Validator::new(keys[i].pub_key(), p))
                .collect();
            let mut set = ValidatorSet::new(vals).unwrap();
            let before = set.clone();

            let changes: Vec<Validator> = changes
                .iter()
                .map(|&(k, p)| Validator::new(keys[k as usize].pub_key(), p))
                .collect();

            match set.update_with_change_set(&changes) {
                Ok(()) => {
                    prop_assert!(!set.is_empty());
                    prop_assert!(set.validators().windows(2).all(|w| w[0].address < w[1].address));
                    let total: i64 = set.validators().iter().map(|v| v.voting_power).sum();
                    prop_assert_eq!(total, set.total_voting_power());
                    prop_assert!(total <= MAX_TOTAL_VOTING_POWER);
                    prop_assert!(set.validators().iter().all(|v| v.voting_power > 0));
                }
                Err(_) => prop_assert_eq!(set, before),
            }
        }

        #[test]
        fn prop_oversized_updates_rejected(
            powers in prop::collection::vec(MAX_TOTAL_VOTING_POWER / 4..=MAX_TOTAL_VOTING_POWER, 2..6),
        ) {
            let changes: Vec<Validator> = powers
                .iter()
                .enumerate()
                .map(|(i, &p)| Validator::new(PrivKey::from_seed([i as u8 + 1; 32]).pub_key(), p))
                .collect();
            let sum: i128 = powers.iter().map(|&p| p as i128).sum();
            let result = ValidatorSet::new(changes);
            if sum > MAX_TOTAL_VOTING_POWER as i128 {
                prop_assert!(
                    matches!(result, Err(ValidatorSetError::ExceedsMaxTotalVotingPower { .. })),
                    "expected ExceedsMaxTotalVotingPower, got {:?}",
                    result
                );
            } else {
                let set = result.unwrap();
                prop_assert!(set.total_voting_power() <= MAX_TOTAL_VOTING_POWER);
            }
        }
    }
}
