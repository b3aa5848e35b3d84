use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chainstor_miner::chain::{ChainClient, DetachedChain};
use chainstor_miner::config::MinerConfig;
use chainstor_miner::server::MineServer;
use chainstor_miner::store::{DagStore, MemDagStore};
use chainstor_miner::tick;

#[tokio::main]
async fn main() -> Result<()> {
    chainstor_core::init_tracing("chainstor-miner");
    let cfg = MinerConfig::from_env();
    chainstor_core::start_health_server(cfg.health_port).await?;

    let db = sled::open(&cfg.db_path)?;
    // TODO: wire the embedding node's block store and chain gateway here.
    let chain: Arc<dyn ChainClient> = Arc::new(DetachedChain);
    let store: Arc<dyn DagStore> = Arc::new(MemDagStore::new());

    let server = Arc::new(MineServer::new(chain, store, db, cfg));
    let ctx = CancellationToken::new();
    if let Err(e) = server.bootstrap(&ctx).await {
        warn!(error = %e, "bootstrap incomplete, continuing");
    }
    info!(peer = %server.peer(), files = server.file_count(), "miner started");

    let puller = tick::spawn_file_puller(server.clone(), ctx.clone());
    let poller = tick::spawn_stage_poller(server.clone(), ctx.clone());

    wait_for_shutdown().await;
    info!("shutdown signal received");
    ctx.cancel();
    let _ = puller.await;
    let _ = poller.await;
    Ok(())
}

async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("sigint handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
}
