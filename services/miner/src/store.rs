//! Content-addressed store seam and DAG expansion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use chainstor_core::cid::Cid;
use chainstor_core::error::MineError;

/// A fetched DAG node: the block's raw bytes plus its outbound links.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub data: Vec<u8>,
    pub links: Vec<Cid>,
}

#[async_trait]
pub trait DagStore: Send + Sync {
    async fn dag_get(&self, cid: &Cid) -> Result<DagNode, MineError>;
}

/// Pre-order walk collecting `root` and every reachable link, under the
/// traversal deadline. The seen-set guards against a misbehaving store
/// serving cyclic links; any failed node fetch aborts the whole file.
pub async fn dag_expand(
    ctx: &CancellationToken,
    store: &dyn DagStore,
    root: Cid,
    deadline: Duration,
) -> Result<Vec<Cid>, MineError> {
    let walk = async {
        let mut out = Vec::new();
        let mut seen: HashSet<Cid> = HashSet::new();
        let mut stack = vec![root];
        while let Some(cid) = stack.pop() {
            if ctx.is_cancelled() {
                return Err(MineError::Cancelled);
            }
            if !seen.insert(cid) {
                continue;
            }
            let node = store.dag_get(&cid).await?;
            out.push(cid);
            for link in node.links.into_iter().rev() {
                stack.push(link);
            }
        }
        Ok(out)
    };
    tokio::time::timeout(deadline, walk)
        .await
        .map_err(|_| MineError::Timeout)?
}

/// In-memory store for detached runs and scenario tests.
#[derive(Debug, Default, Clone)]
pub struct MemDagStore {
    nodes: Arc<RwLock<HashMap<Cid, DagNode>>>,
}

impl MemDagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a leaf block; its CID is derived from the bytes.
    pub fn put_block(&self, data: &[u8]) -> Cid {
        self.put_node(data, Vec::new())
    }

    /// Insert a block with outbound links.
    pub fn put_node(&self, data: &[u8], links: Vec<Cid>) -> Cid {
        let cid = Cid::for_block(data);
        self.nodes.write().insert(
            cid,
            DagNode {
                data: data.to_vec(),
                links,
            },
        );
        cid
    }

    pub fn remove(&self, cid: &Cid) {
        self.nodes.write().remove(cid);
    }
}

#[async_trait]
impl DagStore for MemDagStore {
    async fn dag_get(&self, cid: &Cid) -> Result<DagNode, MineError> {
        self.nodes
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| MineError::FetchFailed(format!("block {cid} not in store")))
    }
}
