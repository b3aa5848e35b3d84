//! The linearized challenge tree: a leaf vector in ascending CID-digest
//! order, and the prefix-match search the Collect and Announce stages run
//! against the mining challenge.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::cid::Cid;
use crate::digest::{common_prefix_bits, Digest};

/// One leaf of the proof tree.
///
/// `challenge_hash = SHA256(storage_challenge ‖ block_raw)` commits to the
/// block under the round's storage challenge; `merkle_hash =
/// SHA256(peer_digest ‖ challenge_hash)` is the peer-salted value placed in
/// the Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofLeaf {
    pub cid: Cid,
    pub challenge_hash: Digest,
    pub merkle_hash: Digest,
}

/// Leaves in strictly increasing CID-digest order, no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortList(Vec<ProofLeaf>);

impl SortList {
    /// Wrap a vector already in ascending digest order (an in-order tree walk).
    pub fn from_sorted(leaves: Vec<ProofLeaf>) -> Self {
        debug_assert!(leaves.windows(2).all(|w| w[0].cid < w[1].cid));
        SortList(leaves)
    }

    pub fn into_inner(self) -> Vec<ProofLeaf> {
        self.0
    }
}

impl Deref for SortList {
    type Target = [ProofLeaf];

    fn deref(&self) -> &[ProofLeaf] {
        &self.0
    }
}

/// Find the leaf whose CID digest shares the longest leading bit-prefix with
/// `q`. Binary-search the lower bound of `q`, then compare the candidate with
/// its immediate predecessor; ties go to the lower index. Returns
/// `(index, prefix_bits)`, or `None` on an empty slice.
pub fn search(leaves: &[ProofLeaf], q: &Digest) -> Option<(usize, u32)> {
    if leaves.is_empty() {
        return None;
    }
    let (mut l, mut r) = (0usize, leaves.len() - 1);
    while l < r {
        let m = (l + r) / 2;
        if leaves[m].cid.digest() < q {
            l = m + 1;
        } else {
            r = m;
        }
    }
    let mut best = l;
    let mut bits = common_prefix_bits(leaves[l].cid.digest(), q);
    if l > 0 {
        let prev = common_prefix_bits(leaves[l - 1].cid.digest(), q);
        if prev >= bits {
            best = l - 1;
            bits = prev;
        }
    }
    Some((best, bits))
}
