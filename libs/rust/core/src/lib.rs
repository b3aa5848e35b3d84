//! Core data structures and process glue for the chainstor mining node.

pub mod cid;
pub mod digest;
pub mod error;
pub mod merkle;
pub mod sortlist;

use std::net::SocketAddr;

use anyhow::Result;
use axum::{routing::get, Router};
use tracing::info;

/// Install the fmt subscriber with env-filter. Safe to call more than once.
pub fn init_tracing(service: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    info!(service, "tracing initialized");
}

/// Spawn the liveness endpoint every chainstor service exposes.
pub async fn start_health_server(port: u16) -> Result<()> {
    let app = Router::new().route("/healthz", get(|| async { "ok" }));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(?addr, "health server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "health server failed");
        }
    });
    Ok(())
}
