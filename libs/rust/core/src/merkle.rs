//! Deterministic binary Merkle tree over a sorted leaf list.
//!
//! The tree is laid out in one contiguous array: level 0 holds the leaves'
//! merkle hashes in positions `[0, n)`, each following level hashes
//! consecutive pairs of the level below, and the root is the final element.
//! A level with an odd node count pairs its last node with itself. Two
//! builds over the same leaves produce byte-identical arrays.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::sortlist::ProofLeaf;

/// Peer-salted leaf value: `SHA256(peer_digest ‖ challenge_hash)`.
pub fn leaf_hash(peer_digest: &Digest, challenge_hash: &Digest) -> Digest {
    Digest::sha256_concat(peer_digest.as_bytes(), challenge_hash.as_bytes())
}

/// Recompute the salted leaf value and compare.
pub fn verify_leaf(peer_digest: &Digest, challenge_hash: &Digest, merkle_hash: &Digest) -> bool {
    leaf_hash(peer_digest, challenge_hash) == *merkle_hash
}

fn combine(left: &Digest, right: &Digest) -> Digest {
    Digest::sha256_concat(left.as_bytes(), right.as_bytes())
}

/// Which side of the pair a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: Digest,
    pub side: Side,
}

/// Inclusion proof: one sibling per level, leaf upward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub steps: Vec<ProofStep>,
}

pub struct MerkleTree {
    nodes: Vec<Digest>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build the full node array over `leaves`. Panics on an empty leaf set;
    /// callers gate on tree size before committing a round.
    pub fn build(leaves: &[ProofLeaf]) -> Self {
        assert!(!leaves.is_empty(), "merkle build over empty leaf list");
        let mut nodes: Vec<Digest> = leaves.iter().map(|l| l.merkle_hash).collect();
        let mut start = 0usize;
        let mut width = leaves.len();
        while width > 1 {
            let mut i = 0;
            while i < width {
                let left = nodes[start + i];
                let right = if i + 1 < width { nodes[start + i + 1] } else { left };
                nodes.push(combine(&left, &right));
                i += 2;
            }
            start += width;
            width = width.div_ceil(2);
        }
        MerkleTree {
            nodes,
            leaf_count: leaves.len(),
        }
    }

    pub fn root(&self) -> Digest {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[Digest] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Proof for leaf `index`: walk toward the root recording each sibling
    /// and its side. A self-paired node records itself on the right.
    pub fn inclusion_proof(&self, index: usize) -> MerkleProof {
        assert!(index < self.leaf_count, "proof index out of range");
        let mut steps = Vec::new();
        let mut start = 0usize;
        let mut width = self.leaf_count;
        let mut i = index;
        while width > 1 {
            let step = if i % 2 == 0 {
                let sibling = if i + 1 < width { i + 1 } else { i };
                ProofStep {
                    hash: self.nodes[start + sibling],
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    hash: self.nodes[start + i - 1],
                    side: Side::Left,
                }
            };
            steps.push(step);
            start += width;
            width = width.div_ceil(2);
            i /= 2;
        }
        MerkleProof { steps }
    }
}

/// Recombine upward from `leaf_merkle_hash` and compare against `root`.
pub fn verify_inclusion(proof: &MerkleProof, leaf_merkle_hash: &Digest, root: &Digest) -> bool {
    let mut acc = *leaf_merkle_hash;
    for step in &proof.steps {
        acc = match step.side {
            Side::Right => combine(&acc, &step.hash),
            Side::Left => combine(&step.hash, &acc),
        };
    }
    acc == *root
}
