//! Chain collaborator seam: stage polling, round submissions, and the
//! on-wire DTOs. The real gateway lives in the embedding node; everything
//! here is injected as `Arc<dyn ChainClient>` so round logic is testable
//! in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainstor_core::digest::Digest;
use chainstor_core::error::MineError;
use chainstor_core::merkle::MerkleProof;

/// Phase of the mining round as published by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Wait,
    Gen,
    Update,
    Collect,
    Announce,
}

/// One stage poll. `s` is the phase payload: a base64 seed during Gen,
/// Update, and Collect, the winner's peer id during Announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePoll {
    pub stage: Stage,
    pub s: String,
    pub blocks_left: u64,
}

/// Stub committing this round's tree: submitted during Gen/Update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreProofDto {
    pub proof_root: String,
    pub store_challenge: String,
    pub peer_id: String,
    pub peer_address: String,
}

/// Best-leaf reveal, submitted during Collect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningDto {
    pub cid: String,
    pub pid: String,
    pub challenge: String,
    pub store_challenge: String,
    pub proof_root: String,
    pub leading_zero: u32,
    pub spv_proof: Option<MerkleProof>,
}

/// Winner's inclusion proof, submitted during Announce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvProofDto {
    pub cid: String,
    pub pid: String,
    pub sv_proof: MerkleProof,
    pub store_challenge: String,
    pub proof_root: String,
    pub challenge_hash: Digest,
    pub proof_leaf: Digest,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current storage challenge, base64 of a 32-byte seed.
    async fn store_challenge(&self) -> Result<String, MineError>;

    /// Current round phase.
    async fn challenge_stage(&self) -> Result<StagePoll, MineError>;

    /// Final mining challenge, read again at Announce time.
    async fn challenge(&self) -> Result<String, MineError>;

    /// CIDs of every currently registered file.
    async fn file_list(&self) -> Result<Vec<String>, MineError>;

    async fn update_or_gen(&self, dto: StoreProofDto) -> Result<(), MineError>;

    async fn mining(&self, dto: MiningDto) -> Result<(), MineError>;

    async fn prove(&self, dto: SvProofDto) -> Result<(), MineError>;
}

/// Stand-in chain used when no gateway is wired: a fixed all-zero storage
/// challenge, a permanently Wait stage, and an empty file list. Lets the
/// daemon run detached.
#[derive(Debug, Default, Clone)]
pub struct DetachedChain;

#[async_trait]
impl ChainClient for DetachedChain {
    async fn store_challenge(&self) -> Result<String, MineError> {
        use base64::Engine as _;
        Ok(base64::engine::general_purpose::STANDARD.encode([0u8; 32]))
    }

    async fn challenge_stage(&self) -> Result<StagePoll, MineError> {
        Ok(StagePoll {
            stage: Stage::Wait,
            s: String::new(),
            blocks_left: 0,
        })
    }

    async fn challenge(&self) -> Result<String, MineError> {
        self.store_challenge().await
    }

    async fn file_list(&self) -> Result<Vec<String>, MineError> {
        Ok(Vec::new())
    }

    async fn update_or_gen(&self, _dto: StoreProofDto) -> Result<(), MineError> {
        Err(MineError::SubmitFailed("detached from chain".into()))
    }

    async fn mining(&self, _dto: MiningDto) -> Result<(), MineError> {
        Err(MineError::SubmitFailed("detached from chain".into()))
    }

    async fn prove(&self, _dto: SvProofDto) -> Result<(), MineError> {
        Err(MineError::SubmitFailed("detached from chain".into()))
    }
}
