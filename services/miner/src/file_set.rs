//! Deduplicated set of every chain-registered file CID, mirrored into the
//! datastore so a restarted node skips files it already ingested.
//!
//! Entries are never removed: the chain has no de-registration delta yet.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

use chainstor_core::cid::Cid;
use chainstor_core::error::MineError;

use crate::artifacts::FILE_SET_PREFIX;

pub struct FileSetIndex {
    set: RwLock<HashSet<Cid>>,
    db: sled::Db,
}

impl FileSetIndex {
    pub fn new(db: sled::Db) -> Self {
        FileSetIndex {
            set: RwLock::new(HashSet::new()),
            db,
        }
    }

    /// Rebuild the in-memory set from the mirror. Keys that no longer parse
    /// are skipped. Returns the number of entries loaded.
    pub fn load_from_mirror(&self) -> Result<usize, MineError> {
        let mut set = self.set.write();
        for item in self.db.scan_prefix(FILE_SET_PREFIX.as_bytes()) {
            let (key, _) = item.map_err(|e| MineError::FetchFailed(format!("datastore: {e}")))?;
            let key = String::from_utf8_lossy(&key);
            let Some(cid_str) = key.strip_prefix(FILE_SET_PREFIX).and_then(|k| k.strip_prefix('/'))
            else {
                continue;
            };
            match Cid::parse(cid_str) {
                Ok(cid) => {
                    set.insert(cid);
                }
                Err(_) => debug!(key = %key, "skipping unparseable file-set key"),
            }
        }
        Ok(set.len())
    }

    pub fn has(&self, cid: &Cid) -> bool {
        self.set.read().contains(cid)
    }

    /// Add to the set and mirror the membership into the datastore.
    pub fn add(&self, cid: Cid) -> Result<(), MineError> {
        self.db
            .insert(format!("{FILE_SET_PREFIX}/{cid}").as_bytes(), Vec::<u8>::new())
            .map_err(|e| MineError::FetchFailed(format!("datastore: {e}")))?;
        self.db
            .flush()
            .map_err(|e| MineError::FetchFailed(format!("datastore: {e}")))?;
        self.set.write().insert(cid);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.set.read().len()
    }
}
