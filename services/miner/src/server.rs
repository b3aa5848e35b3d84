//! The round state machine.
//!
//! One server owns the challenge tree, the file set, and the last submitted
//! stub, and drives the phased protocol: Gen/Update commit a Merkle root on
//! chain, Collect reveals the best-matching leaf, Announce proves inclusion
//! if this node won. Stage handlers are fault-isolated: every error becomes
//! a retry interval, never a crash.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainstor_core::cid::{Cid, PeerId};
use chainstor_core::digest::Digest;
use chainstor_core::error::MineError;
use chainstor_core::merkle::MerkleTree;
use chainstor_core::sortlist::search;

use crate::artifacts::{ArtifactStore, PreSend};
use crate::chain::{ChainClient, MiningDto, Stage, StagePoll, StoreProofDto, SvProofDto};
use crate::challenge_tree::ChallengeTree;
use crate::config::MinerConfig;
use crate::file_set::FileSetIndex;
use crate::store::{dag_expand, DagStore};

/// Everything a round mutates, behind one writer lock: a reader sees the
/// fully reseeded tree or the pre-reseed tree, never a mix, and ingestion
/// waits while a reseed runs.
struct RoundState {
    tree: ChallengeTree,
    pre: Option<PreSend>,
    stage: Stage,
    s: String,
}

impl RoundState {
    /// Whether the stub on record already covers the tree as it stands.
    fn stub_sent(&self) -> bool {
        match &self.pre {
            Some(pre) => {
                pre.file_num == self.tree.size()
                    && pre.store_challenge.as_slice() == self.tree.store_challenge()
            }
            None => false,
        }
    }
}

pub struct MineServer {
    state: RwLock<RoundState>,
    files: FileSetIndex,
    artifacts: ArtifactStore,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn DagStore>,
    peer: PeerId,
    cfg: MinerConfig,
}

impl MineServer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn DagStore>,
        db: sled::Db,
        cfg: MinerConfig,
    ) -> Self {
        let peer = PeerId::new(cfg.peer_id.clone());
        MineServer {
            state: RwLock::new(RoundState {
                tree: ChallengeTree::new(Vec::new()),
                pre: None,
                stage: Stage::Wait,
                s: String::new(),
            }),
            files: FileSetIndex::new(db.clone()),
            artifacts: ArtifactStore::new(db),
            chain,
            store,
            peer,
            cfg,
        }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.cfg
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub async fn tree_size(&self) -> usize {
        self.state.read().await.tree.size()
    }

    pub async fn pre(&self) -> Option<PreSend> {
        self.state.read().await.pre.clone()
    }

    /// Startup recovery: rebuild the file set from its mirror, adopt the
    /// persisted stub if it still belongs to the chain's current storage
    /// challenge, then run one file pull before the tickers start.
    pub async fn bootstrap(&self, ctx: &CancellationToken) -> Result<(), MineError> {
        let loaded = self.files.load_from_mirror()?;
        let challenge_b64 = self.chain.store_challenge().await?;
        let challenge = decode_b64(&challenge_b64)?;
        {
            let mut st = self.state.write().await;
            st.tree = ChallengeTree::new(challenge.clone());
            st.pre = match self.artifacts.get_pre()? {
                Some(pre) if pre.store_challenge == challenge => Some(pre),
                _ => None,
            };
        }
        info!(files = loaded, "file-set mirror loaded");
        self.pull_files(ctx).await;
        info!(blocks = self.tree_size().await, "challenge tree built");
        Ok(())
    }

    /// Pull the chain file list and ingest every file not yet in the set.
    /// A file that fails to ingest is left out of the set and retried on
    /// the next pull.
    pub async fn pull_files(&self, ctx: &CancellationToken) {
        let list = match self.chain.file_list().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "file list fetch failed");
                return;
            }
        };
        for entry in list {
            if ctx.is_cancelled() {
                return;
            }
            let cid = match Cid::parse(&entry) {
                Ok(cid) => cid,
                Err(_) => {
                    debug!(cid = %entry, "skipping unparseable file cid");
                    continue;
                }
            };
            if self.files.has(&cid) {
                continue;
            }
            match self.ingest_file(ctx, cid).await {
                Ok(blocks) => info!(file = %cid, blocks, "file ingested"),
                Err(e) => warn!(file = %cid, error = %e, "file ingestion failed"),
            }
        }
    }

    async fn ingest_file(&self, ctx: &CancellationToken, cid: Cid) -> Result<usize, MineError> {
        let blocks = dag_expand(ctx, self.store.as_ref(), cid, self.cfg.dag_timeout).await?;
        {
            let mut st = self.state.write().await;
            st.tree.insert_many(ctx, self.store.as_ref(), &blocks).await?;
        }
        self.files.add(cid)?;
        Ok(blocks.len())
    }

    /// One stage tick. Errors are logged and classified into the interval
    /// the poller should sleep before retrying.
    pub async fn check_stage(&self, ctx: &CancellationToken) -> Duration {
        match self.tick(ctx).await {
            Ok(interval) => interval,
            Err(MineError::Cancelled) => self.cfg.slow,
            Err(e) if e.is_precondition() => {
                warn!(error = %e, "stage precondition missing");
                self.cfg.slow
            }
            Err(e) => {
                warn!(error = %e, "stage tick failed");
                self.cfg.quick
            }
        }
    }

    async fn tick(&self, ctx: &CancellationToken) -> Result<Duration, MineError> {
        let poll = self.chain.challenge_stage().await?;
        let left = self.cfg.block_time * poll.blocks_left as u32;

        // Same round, same payload: nothing to redo.
        {
            let st = self.state.read().await;
            if st.stage == poll.stage && st.s == poll.s {
                return Ok(left);
            }
        }

        let interval = match poll.stage {
            Stage::Gen | Stage::Update => {
                self.commit(ctx).await?;
                left
            }
            Stage::Collect => {
                self.collect(&poll).await?;
                left
            }
            Stage::Announce => {
                if poll.s == self.peer.as_str() {
                    self.announce().await?;
                    left
                } else {
                    debug!(winner = %poll.s, "round won elsewhere");
                    self.cfg.slow
                }
            }
            Stage::Wait => self.cfg.slow,
        };

        let mut st = self.state.write().await;
        st.stage = poll.stage;
        st.s = poll.s;
        Ok(interval)
    }

    /// Gen/Update: reseed against the published storage challenge, build
    /// the Merkle tree, persist the snapshot, submit the stub, record `Pre`.
    /// The snapshot is durable before the stub can be observed on chain.
    async fn commit(&self, ctx: &CancellationToken) -> Result<(), MineError> {
        let challenge_b64 = self.chain.store_challenge().await?;
        let challenge = decode_b64(&challenge_b64)?;

        let mut st = self.state.write().await;
        if st.tree.store_challenge() == challenge.as_slice() && st.stub_sent() {
            debug!("stub already submitted for this storage challenge");
            return Ok(());
        }
        st.tree.reseed(ctx, self.store.as_ref(), &challenge).await?;
        let size = st.tree.size();
        if size == 0 {
            debug!("challenge tree is empty, nothing to commit");
            return Ok(());
        }
        let leaves = st.tree.snapshot(&self.peer);
        let tree = MerkleTree::build(&leaves);
        let root_hex = tree.root().to_hex();

        self.artifacts
            .put_snapshot(&challenge_b64, &root_hex, &leaves, size)?;
        self.chain
            .update_or_gen(StoreProofDto {
                proof_root: root_hex.clone(),
                store_challenge: challenge_b64,
                peer_id: self.peer.as_str().to_string(),
                peer_address: String::new(),
            })
            .await?;
        let pre = PreSend {
            file_num: size,
            store_challenge: challenge,
            merkle_root: root_hex,
        };
        self.artifacts.put_pre(&pre)?;
        info!(file_num = size, root = %pre.merkle_root, "stored-proof stub submitted");
        st.pre = Some(pre);
        Ok(())
    }

    /// Collect: search the committed prefix of the persisted snapshot for
    /// the leaf closest to the mining challenge and reveal it.
    async fn collect(&self, poll: &StagePoll) -> Result<(), MineError> {
        let challenge = decode_b64(&self.chain.store_challenge().await?)?;
        let pre = self
            .state
            .read()
            .await
            .pre
            .clone()
            .ok_or(MineError::StubMissing)?;
        if pre.store_challenge != challenge {
            return Err(MineError::StubMissing);
        }
        let record = self
            .artifacts
            .get_snapshot(&BASE64.encode(&pre.store_challenge), &pre.merkle_root)?;
        let q = decode_digest(&poll.s)?;

        let window = &record.sort_list[..pre.file_num.min(record.sort_list.len())];
        let (index, bits) = search(window, &q).ok_or(MineError::StubMissing)?;
        let best = &window[index];

        self.chain
            .mining(MiningDto {
                cid: best.cid.to_string(),
                pid: self.peer.as_str().to_string(),
                challenge: poll.s.clone(),
                store_challenge: record.store_challenge.clone(),
                proof_root: record.root.clone(),
                leading_zero: bits,
                spv_proof: None,
            })
            .await?;
        info!(cid = %best.cid, leading_zero = bits, "best leaf submitted");
        Ok(())
    }

    /// Announce, winner path: rebuild the committed tree, extract the
    /// inclusion proof for the winning leaf, and reveal it.
    async fn announce(&self) -> Result<(), MineError> {
        let pre = self
            .state
            .read()
            .await
            .pre
            .clone()
            .ok_or(MineError::StubMissing)?;
        let record = self
            .artifacts
            .get_snapshot(&BASE64.encode(&pre.store_challenge), &pre.merkle_root)?;
        // The final mining challenge has its own accessor; the stage payload
        // carried the winner's peer id instead.
        let q = decode_digest(&self.chain.challenge().await?)?;

        let window = &record.sort_list[..pre.file_num.min(record.sort_list.len())];
        let (index, _) = search(window, &q).ok_or(MineError::StubMissing)?;
        let best = window[index].clone();

        let tree = MerkleTree::build(&record.sort_list);
        let proof = tree.inclusion_proof(index);
        self.chain
            .prove(SvProofDto {
                cid: best.cid.to_string(),
                pid: self.peer.as_str().to_string(),
                sv_proof: proof,
                store_challenge: record.store_challenge.clone(),
                proof_root: record.root.clone(),
                challenge_hash: best.challenge_hash,
                proof_leaf: best.merkle_hash,
            })
            .await?;
        info!(cid = %best.cid, "inclusion proof revealed");
        Ok(())
    }
}

fn decode_b64(s: &str) -> Result<Vec<u8>, MineError> {
    BASE64
        .decode(s)
        .map_err(|_| MineError::FetchFailed("invalid base64 challenge".into()))
}

fn decode_digest(s: &str) -> Result<Digest, MineError> {
    Digest::from_slice(&decode_b64(s)?)
}
