//! The challenge tree: an ordered map from block CID to its challenge hash
//! under the current storage challenge.
//!
//! Keys order by CID digest so the linearized tree, and therefore the
//! Merkle root, depends only on content, never on network arrival order.
//! Writer exclusivity for `insert_many` and `reseed` is provided by the
//! round-state lock in the server.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use chainstor_core::cid::{Cid, PeerId};
use chainstor_core::digest::Digest;
use chainstor_core::error::MineError;
use chainstor_core::merkle;
use chainstor_core::sortlist::{ProofLeaf, SortList};

use crate::store::DagStore;

pub struct ChallengeTree {
    entries: BTreeMap<Cid, Digest>,
    store_challenge: Vec<u8>,
}

impl ChallengeTree {
    pub fn new(store_challenge: Vec<u8>) -> Self {
        ChallengeTree {
            entries: BTreeMap::new(),
            store_challenge,
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn store_challenge(&self) -> &[u8] {
        &self.store_challenge
    }

    /// Ingest blocks: fetch each block's raw bytes, hash them under the
    /// current storage challenge, and insert-or-update. Returns the number
    /// of new entries. Checks the cancellation token between nodes; an
    /// aborted run keeps whatever it already wrote.
    pub async fn insert_many(
        &mut self,
        ctx: &CancellationToken,
        store: &dyn DagStore,
        cids: &[Cid],
    ) -> Result<usize, MineError> {
        let mut added = 0;
        for cid in cids {
            if ctx.is_cancelled() {
                return Err(MineError::Cancelled);
            }
            let node = store.dag_get(cid).await?;
            let hash = Digest::sha256_concat(&self.store_challenge, &node.data);
            if self.entries.insert(*cid, hash).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Re-derive every entry against a new storage challenge, re-fetching
    /// block bytes from the store. No-op when the challenge is unchanged.
    /// The current challenge is only advanced once every entry has been
    /// recomputed, so a failed reseed is retried in full on the next tick.
    pub async fn reseed(
        &mut self,
        ctx: &CancellationToken,
        store: &dyn DagStore,
        challenge: &[u8],
    ) -> Result<(), MineError> {
        if challenge == self.store_challenge {
            return Ok(());
        }
        let cids: Vec<Cid> = self.entries.keys().copied().collect();
        for cid in cids {
            if ctx.is_cancelled() {
                return Err(MineError::Cancelled);
            }
            let node = store.dag_get(&cid).await?;
            self.entries
                .insert(cid, Digest::sha256_concat(challenge, &node.data));
        }
        self.store_challenge = challenge.to_vec();
        Ok(())
    }

    /// In-order walk into a sorted leaf list, computing each leaf's
    /// peer-salted merkle hash.
    pub fn snapshot(&self, peer: &PeerId) -> SortList {
        let leaves = self
            .entries
            .iter()
            .map(|(cid, challenge_hash)| ProofLeaf {
                cid: *cid,
                challenge_hash: *challenge_hash,
                merkle_hash: merkle::leaf_hash(peer.digest(), challenge_hash),
            })
            .collect();
        SortList::from_sorted(leaves)
    }
}
