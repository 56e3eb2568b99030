//! Simple binary Merkle tree over byte slices
//!
//! Leaves and inner nodes are domain separated with a one-byte prefix so a
//! leaf can never be confused with an inner node. The tree is split at the
//! largest power of two strictly below the number of items, which keeps it
//! balanced on the left.

use crate::crypto::sum;
use crate::Hash;

const LEAF_PREFIX: u8 = 0x00;
const INNER_PREFIX: u8 = 0x01;

/// Merkle root of `items`, or `None` for an empty list
pub fn simple_hash_from_byte_slices<T: AsRef<[u8]>>(items: &[T]) -> Option<Hash> {
    match items.len() {
        0 => None,
        1 => Some(leaf_hash(items[0].as_ref())),
        n => {
            let k = split_point(n);
            let left = simple_hash_from_byte_slices(&items[..k])?;
            let right = simple_hash_from_byte_slices(&items[k..])?;
            Some(inner_hash(&left, &right))
        }
    }
}

fn leaf_hash(leaf: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(1 + leaf.len());
    buf.push(LEAF_PREFIX);
    buf.extend_from_slice(leaf);
    sum(&buf)
}

fn inner_hash(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(1 + 2 * 32);
    buf.push(INNER_PREFIX);
    buf.extend_from_slice(left.as_ref());
    buf.extend_from_slice(right.as_ref());
    sum(&buf)
}

/// Largest power of two strictly less than `n` (n >= 2)
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}
