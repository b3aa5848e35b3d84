//! Durable round artifacts: the last submitted stub and the indexed Merkle
//! snapshots a later stage must reproduce exactly.

use serde::{Deserialize, Serialize};

use chainstor_core::error::MineError;
use chainstor_core::sortlist::SortList;

pub const PRE_SEND_KEY: &str = "/preSend";
pub const MERKLE_TREE_PREFIX: &str = "/merkleTree";
pub const FILE_SET_PREFIX: &str = "/chainFile";

/// The stub most recently submitted on chain: at most one per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSend {
    pub file_num: usize,
    pub store_challenge: Vec<u8>,
    pub merkle_root: String,
}

/// Persisted tree snapshot keyed by `(storage challenge, root)`. The leaf
/// list is enough: rebuilding the node array from it is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTreeRecord {
    pub sort_list: SortList,
    pub size: usize,
    pub store_challenge: String,
    pub root: String,
}

#[derive(Clone)]
pub struct ArtifactStore {
    db: sled::Db,
}

impl ArtifactStore {
    pub fn new(db: sled::Db) -> Self {
        ArtifactStore { db }
    }

    pub fn put_pre(&self, pre: &PreSend) -> Result<(), MineError> {
        let bytes = serde_json::to_vec(pre).map_err(store_err)?;
        self.db.insert(PRE_SEND_KEY, bytes).map_err(store_err)?;
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    pub fn get_pre(&self) -> Result<Option<PreSend>, MineError> {
        match self.db.get(PRE_SEND_KEY).map_err(store_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_snapshot(
        &self,
        challenge_b64: &str,
        root_hex: &str,
        sort_list: &SortList,
        size: usize,
    ) -> Result<(), MineError> {
        let record = MerkleTreeRecord {
            sort_list: sort_list.clone(),
            size,
            store_challenge: challenge_b64.to_string(),
            root: root_hex.to_string(),
        };
        let bytes = serde_json::to_vec(&record).map_err(store_err)?;
        self.db
            .insert(snapshot_key(challenge_b64, root_hex), bytes)
            .map_err(store_err)?;
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    pub fn get_snapshot(
        &self,
        challenge_b64: &str,
        root_hex: &str,
    ) -> Result<MerkleTreeRecord, MineError> {
        let bytes = self
            .db
            .get(snapshot_key(challenge_b64, root_hex))
            .map_err(store_err)?
            .ok_or_else(|| MineError::SnapshotMissing {
                challenge: challenge_b64.to_string(),
                root: root_hex.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(store_err)
    }
}

fn snapshot_key(challenge_b64: &str, root_hex: &str) -> String {
    format!("{MERKLE_TREE_PREFIX}/{challenge_b64}/{root_hex}")
}

fn store_err(e: impl std::fmt::Display) -> MineError {
    MineError::FetchFailed(format!("datastore: {e}"))
}
