//! Service tunables, read from the environment with compiled defaults.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub peer_id: String,
    pub db_path: PathBuf,
    pub health_port: u16,
    /// Stage poll period and floor for chain-suggested intervals.
    pub stage_tick: Duration,
    /// File-list pull period.
    pub file_tick: Duration,
    /// Retry after a transient failure.
    pub quick: Duration,
    /// Retry while a precondition (stub, snapshot) is missing.
    pub slow: Duration,
    /// Chain block time, used to convert `blocks_left` into a sleep.
    pub block_time: Duration,
    /// Deadline for one file's DAG expansion.
    pub dag_timeout: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            peer_id: "chainstor-miner".into(),
            db_path: PathBuf::from("/tmp/chainstor-miner"),
            health_port: 8081,
            stage_tick: Duration::from_secs(10),
            file_tick: Duration::from_secs(3600),
            quick: Duration::from_secs(30),
            slow: Duration::from_secs(90),
            block_time: Duration::from_secs(6),
            dag_timeout: Duration::from_secs(120),
        }
    }
}

impl MinerConfig {
    pub fn from_env() -> Self {
        let d = MinerConfig::default();
        MinerConfig {
            peer_id: std::env::var("MINER_PEER_ID").unwrap_or(d.peer_id),
            db_path: std::env::var("MINER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.db_path),
            health_port: env_parse("MINER_HEALTH_PORT", d.health_port),
            stage_tick: env_secs("MINER_STAGE_TICK_SECS", d.stage_tick),
            file_tick: env_secs("MINER_FILE_TICK_SECS", d.file_tick),
            quick: env_secs("MINER_QUICK_RETRY_SECS", d.quick),
            slow: env_secs("MINER_SLOW_RETRY_SECS", d.slow),
            block_time: env_secs("MINER_BLOCK_TIME_SECS", d.block_time),
            dag_timeout: env_secs("MINER_DAG_TIMEOUT_SECS", d.dag_timeout),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
