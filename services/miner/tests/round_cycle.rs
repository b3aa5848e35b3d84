//! End-to-end round scenarios driven through an in-process mock chain and
//! an in-memory block store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use chainstor_core::cid::{Cid, PeerId};
use chainstor_core::digest::Digest;
use chainstor_core::error::MineError;
use chainstor_core::merkle::{self, MerkleTree};
use chainstor_core::sortlist::{ProofLeaf, SortList};
use chainstor_miner::artifacts::ArtifactStore;
use chainstor_miner::chain::{
    ChainClient, MiningDto, Stage, StagePoll, StoreProofDto, SvProofDto,
};
use chainstor_miner::config::MinerConfig;
use chainstor_miner::server::MineServer;
use chainstor_miner::store::MemDagStore;

const PEER: &str = "peer-under-test";

struct MockChain {
    store_challenge: Mutex<String>,
    stage: Mutex<StagePoll>,
    mining_challenge: Mutex<String>,
    files: Mutex<Vec<String>>,
    stubs: Mutex<Vec<StoreProofDto>>,
    minings: Mutex<Vec<MiningDto>>,
    proofs: Mutex<Vec<SvProofDto>>,
}

impl MockChain {
    fn new(store_challenge: &[u8]) -> Arc<Self> {
        Arc::new(MockChain {
            store_challenge: Mutex::new(BASE64.encode(store_challenge)),
            stage: Mutex::new(StagePoll {
                stage: Stage::Wait,
                s: String::new(),
                blocks_left: 0,
            }),
            mining_challenge: Mutex::new(String::new()),
            files: Mutex::new(Vec::new()),
            stubs: Mutex::new(Vec::new()),
            minings: Mutex::new(Vec::new()),
            proofs: Mutex::new(Vec::new()),
        })
    }

    fn set_store_challenge(&self, challenge: &[u8]) {
        *self.store_challenge.lock() = BASE64.encode(challenge);
    }

    fn set_stage(&self, stage: Stage, s: impl Into<String>, blocks_left: u64) {
        *self.stage.lock() = StagePoll {
            stage,
            s: s.into(),
            blocks_left,
        };
    }

    fn set_mining_challenge(&self, seed: &Digest) {
        *self.mining_challenge.lock() = BASE64.encode(seed.as_bytes());
    }

    fn set_files(&self, cids: &[Cid]) {
        *self.files.lock() = cids.iter().map(|c| c.to_string()).collect();
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn store_challenge(&self) -> Result<String, MineError> {
        Ok(self.store_challenge.lock().clone())
    }

    async fn challenge_stage(&self) -> Result<StagePoll, MineError> {
        Ok(self.stage.lock().clone())
    }

    async fn challenge(&self) -> Result<String, MineError> {
        Ok(self.mining_challenge.lock().clone())
    }

    async fn file_list(&self) -> Result<Vec<String>, MineError> {
        Ok(self.files.lock().clone())
    }

    async fn update_or_gen(&self, dto: StoreProofDto) -> Result<(), MineError> {
        self.stubs.lock().push(dto);
        Ok(())
    }

    async fn mining(&self, dto: MiningDto) -> Result<(), MineError> {
        self.minings.lock().push(dto);
        Ok(())
    }

    async fn prove(&self, dto: SvProofDto) -> Result<(), MineError> {
        self.proofs.lock().push(dto);
        Ok(())
    }
}

struct Harness {
    chain: Arc<MockChain>,
    store: MemDagStore,
    server: Arc<MineServer>,
    artifacts: ArtifactStore,
    ctx: CancellationToken,
}

fn harness(store_challenge: &[u8]) -> Harness {
    let chain = MockChain::new(store_challenge);
    let store = MemDagStore::new();
    let db = sled::Config::new().temporary(true).open().unwrap();
    let cfg = MinerConfig {
        peer_id: PEER.into(),
        ..MinerConfig::default()
    };
    let server = Arc::new(MineServer::new(
        chain.clone(),
        Arc::new(store.clone()),
        db.clone(),
        cfg,
    ));
    Harness {
        chain,
        store,
        server,
        artifacts: ArtifactStore::new(db),
        ctx: CancellationToken::new(),
    }
}

/// Root the server is expected to commit for single-block files.
fn expected_root(challenge: &[u8], blocks: &[&[u8]], peer: &PeerId) -> String {
    let mut leaves: Vec<ProofLeaf> = blocks
        .iter()
        .map(|data| {
            let challenge_hash = Digest::sha256_concat(challenge, data);
            ProofLeaf {
                cid: Cid::for_block(data),
                merkle_hash: merkle::leaf_hash(peer.digest(), &challenge_hash),
                challenge_hash,
            }
        })
        .collect();
    leaves.sort_by(|a, b| a.cid.cmp(&b.cid));
    MerkleTree::build(&SortList::from_sorted(leaves))
        .root()
        .to_hex()
}

const C1: [u8; 32] = [0u8; 32];

#[tokio::test]
async fn empty_startup_submits_nothing() {
    let h = harness(&C1);
    h.server.bootstrap(&h.ctx).await.unwrap();
    h.server.pull_files(&h.ctx).await;
    h.server.check_stage(&h.ctx).await;

    assert_eq!(h.server.file_count(), 0);
    assert_eq!(h.server.tree_size().await, 0);
    assert!(h.server.pre().await.is_none());
    assert!(h.chain.stubs.lock().is_empty());
    assert!(h.chain.minings.lock().is_empty());
    assert!(h.chain.proofs.lock().is_empty());
}

#[tokio::test]
async fn first_gen_round_commits_root_and_snapshot() {
    let h = harness(&C1);
    let cid_a = h.store.put_block(b"A");
    let cid_b = h.store.put_block(b"B");
    h.chain.set_files(&[cid_a, cid_b]);
    h.chain.set_stage(Stage::Gen, "round1", 10);

    h.server.bootstrap(&h.ctx).await.unwrap();
    assert_eq!(h.server.tree_size().await, 2);

    let interval = h.server.check_stage(&h.ctx).await;
    assert_eq!(interval, Duration::from_secs(60));

    let stubs = h.chain.stubs.lock();
    assert_eq!(stubs.len(), 1);
    let root = expected_root(&C1, &[b"A", b"B"], h.server.peer());
    assert_eq!(stubs[0].proof_root, root);
    assert_eq!(stubs[0].store_challenge, BASE64.encode(C1));
    assert_eq!(stubs[0].peer_id, PEER);

    let pre = h.server.pre().await.unwrap();
    assert_eq!(pre.file_num, 2);
    assert_eq!(pre.store_challenge, C1.to_vec());
    assert_eq!(pre.merkle_root, root);
    assert_eq!(h.artifacts.get_pre().unwrap().unwrap(), pre);

    let record = h.artifacts.get_snapshot(&BASE64.encode(C1), &root).unwrap();
    assert_eq!(record.size, 2);
    assert_eq!(record.sort_list.len(), 2);
}

#[tokio::test]
async fn replayed_gen_round_submits_once() {
    let h = harness(&C1);
    let cid = h.store.put_block(b"A");
    h.chain.set_files(&[cid]);
    h.chain.set_stage(Stage::Gen, "round1", 5);
    h.server.bootstrap(&h.ctx).await.unwrap();

    h.server.check_stage(&h.ctx).await;
    // Identical (stage, s): short-circuited before any chain write.
    h.server.check_stage(&h.ctx).await;
    assert_eq!(h.chain.stubs.lock().len(), 1);

    // New payload, same challenge, stub already covers the tree: no resend.
    h.chain.set_stage(Stage::Gen, "round1-again", 5);
    h.server.check_stage(&h.ctx).await;
    assert_eq!(h.chain.stubs.lock().len(), 1);
}

#[tokio::test]
async fn collect_reveals_the_best_leaf() {
    let h = harness(&C1);
    let cid_a = h.store.put_block(b"A");
    let cid_b = h.store.put_block(b"B");
    h.chain.set_files(&[cid_a, cid_b]);
    h.chain.set_stage(Stage::Gen, "round1", 5);
    h.server.bootstrap(&h.ctx).await.unwrap();
    h.server.check_stage(&h.ctx).await;
    let pre = h.server.pre().await.unwrap();

    // Mining challenge equal to CIDa's digest: 256 leading bits in common.
    h.chain
        .set_stage(Stage::Collect, BASE64.encode(cid_a.digest().as_bytes()), 5);
    h.server.check_stage(&h.ctx).await;

    let minings = h.chain.minings.lock();
    assert_eq!(minings.len(), 1);
    assert_eq!(minings[0].cid, cid_a.to_string());
    assert_eq!(minings[0].leading_zero, 256);
    assert_eq!(minings[0].proof_root, pre.merkle_root);
    assert_eq!(minings[0].pid, PEER);
}

#[tokio::test]
async fn collect_without_stub_submits_nothing() {
    let h = harness(&C1);
    let cid = h.store.put_block(b"A");
    h.chain.set_files(&[cid]);
    h.server.bootstrap(&h.ctx).await.unwrap();

    let q = Digest::sha256(b"challenge");
    h.chain
        .set_stage(Stage::Collect, BASE64.encode(q.as_bytes()), 5);
    let interval = h.server.check_stage(&h.ctx).await;

    assert!(h.chain.minings.lock().is_empty());
    assert_eq!(interval, h.server.config().slow);
}

#[tokio::test]
async fn announce_winner_reveals_a_verifying_proof() {
    let h = harness(&C1);
    let blocks: Vec<Vec<u8>> = (0..9).map(|i| format!("file{i}").into_bytes()).collect();
    let cids: Vec<Cid> = blocks.iter().map(|b| h.store.put_block(b)).collect();
    h.chain.set_files(&cids);
    h.chain.set_stage(Stage::Gen, "round1", 5);
    h.server.bootstrap(&h.ctx).await.unwrap();
    h.server.check_stage(&h.ctx).await;
    let pre = h.server.pre().await.unwrap();

    let target = cids[4];
    h.chain.set_mining_challenge(target.digest());
    h.chain.set_stage(Stage::Announce, PEER, 5);
    h.server.check_stage(&h.ctx).await;

    let proofs = h.chain.proofs.lock();
    assert_eq!(proofs.len(), 1);
    let dto = &proofs[0];
    assert_eq!(dto.cid, target.to_string());
    assert_eq!(dto.proof_root, pre.merkle_root);

    let root = Digest::from_hex(&dto.proof_root).unwrap();
    assert!(merkle::verify_inclusion(&dto.sv_proof, &dto.proof_leaf, &root));
    assert!(merkle::verify_leaf(
        h.server.peer().digest(),
        &dto.challenge_hash,
        &dto.proof_leaf,
    ));
}

#[tokio::test]
async fn announce_non_winner_stays_silent() {
    let h = harness(&C1);
    let cid = h.store.put_block(b"A");
    h.chain.set_files(&[cid]);
    h.chain.set_stage(Stage::Gen, "round1", 5);
    h.server.bootstrap(&h.ctx).await.unwrap();
    h.server.check_stage(&h.ctx).await;

    h.chain.set_stage(Stage::Announce, "some-other-peer", 7);
    let first = h.server.check_stage(&h.ctx).await;
    assert_eq!(first, h.server.config().slow);
    assert!(h.chain.proofs.lock().is_empty());

    // Replay of the same (stage, s) is a no-op returning the block-time lead.
    let second = h.server.check_stage(&h.ctx).await;
    assert_eq!(second, Duration::from_secs(42));
    assert!(h.chain.proofs.lock().is_empty());
}

#[tokio::test]
async fn reseed_mid_round_rebuilds_under_new_challenge() {
    let h = harness(&C1);
    let blocks: Vec<Vec<u8>> = (0..100).map(|i| format!("piece{i}").into_bytes()).collect();
    let cids: Vec<Cid> = blocks.iter().map(|b| h.store.put_block(b)).collect();
    h.chain.set_files(&cids);
    h.chain.set_stage(Stage::Gen, "round1", 5);
    h.server.bootstrap(&h.ctx).await.unwrap();
    h.server.check_stage(&h.ctx).await;
    let root1 = h.server.pre().await.unwrap().merkle_root;

    let c2 = [7u8; 32];
    h.chain.set_store_challenge(&c2);
    h.chain.set_stage(Stage::Gen, "round2", 5);
    h.server.check_stage(&h.ctx).await;

    let pre = h.server.pre().await.unwrap();
    let root2 = pre.merkle_root.clone();
    assert_ne!(root1, root2);
    assert_eq!(pre.store_challenge, c2.to_vec());

    // Both snapshots remain readable, and every reseeded leaf commits to
    // the new challenge over the block's raw bytes.
    assert!(h.artifacts.get_snapshot(&BASE64.encode(C1), &root1).is_ok());
    let record = h
        .artifacts
        .get_snapshot(&BASE64.encode(c2), &root2)
        .unwrap();
    assert_eq!(record.size, 100);
    for leaf in record.sort_list.iter() {
        let raw = blocks
            .iter()
            .find(|b| Cid::for_block(b) == leaf.cid)
            .unwrap();
        assert_eq!(leaf.challenge_hash, Digest::sha256_concat(&c2, raw));
    }
}

#[tokio::test]
async fn multi_block_files_expand_into_the_tree() {
    let h = harness(&C1);
    let leaf_a = h.store.put_block(b"chunk-a");
    let leaf_b = h.store.put_block(b"chunk-b");
    let root_node = h.store.put_node(b"manifest", vec![leaf_a, leaf_b]);
    h.chain.set_files(&[root_node]);

    h.server.bootstrap(&h.ctx).await.unwrap();
    assert_eq!(h.server.file_count(), 1);
    assert_eq!(h.server.tree_size().await, 3);
}

#[tokio::test]
async fn failed_file_is_retried_on_the_next_pull() {
    let h = harness(&C1);
    let missing_leaf = h.store.put_block(b"will vanish");
    let file = h.store.put_node(b"manifest", vec![missing_leaf]);
    h.store.remove(&missing_leaf);
    h.chain.set_files(&[file]);

    h.server.bootstrap(&h.ctx).await.unwrap();
    assert_eq!(h.server.file_count(), 0);

    // The block reappears; the next pull picks the file up.
    h.store.put_block(b"will vanish");
    h.server.pull_files(&h.ctx).await;
    assert_eq!(h.server.file_count(), 1);
    assert_eq!(h.server.tree_size().await, 2);
}
