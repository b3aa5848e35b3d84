//! Periodic glue: the hourly file puller and the stage poller.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::server::MineServer;

/// Pull the chain file list on a fixed period until cancelled.
pub fn spawn_file_puller(server: Arc<MineServer>, ctx: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = server.config().file_tick;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(period) => server.pull_files(&ctx).await,
            }
        }
        info!("file puller stopped");
    })
}

/// Poll the round stage, sleeping whatever interval the handler suggests,
/// never under the configured tick.
pub fn spawn_stage_poller(server: Arc<MineServer>, ctx: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let floor = server.config().stage_tick;
        let mut next = floor;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(next) => {
                    next = server.check_stage(&ctx).await.max(floor);
                }
            }
        }
        info!("stage poller stopped");
    })
}
