//! Stable error taxonomy shared by the mining service and its collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MineError {
    /// A block, DAG node, or chain read failed.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// A required persisted record is absent.
    #[error("record not found: {0}")]
    NotFound(String),

    /// No stub was submitted for the current storage challenge.
    #[error("stored-proof stub missing for the current storage challenge")]
    StubMissing,

    /// No persisted tree exists for the (challenge, root) pair the stub committed to.
    #[error("no persisted merkle tree for challenge {challenge} root {root}")]
    SnapshotMissing { challenge: String, root: String },

    /// A decoded multihash digest was not 32 bytes.
    #[error("digest length {0}, expected 32 bytes")]
    DigestLength(usize),

    /// A chain RPC submission failed.
    #[error("chain submission failed: {0}")]
    SubmitFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,
}

impl MineError {
    /// Missing-precondition errors ask for the slow retry schedule;
    /// everything else on the tick path is treated as transient.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MineError::StubMissing | MineError::SnapshotMissing { .. } | MineError::NotFound(_)
        )
    }
}
