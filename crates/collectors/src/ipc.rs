//! IPC metrics collector.
//!
//! Polls the node's mempool socket once per second. Each poll opens a fresh
//! connection, writes one newline-terminated `monad_getMetrics` request and
//! reads one reply; the counterparty closes its side unpredictably, and
//! per-poll connections avoid broken-pipe faults between cycles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::CollectorError;

/// Poll period.
pub const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Per-request write and read deadlines.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum snapshot age before `is_healthy` reports false.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(5);

/// Reply buffer size. Replies are a single JSON object well under this.
const REPLY_BUFFER_SIZE: usize = 16 * 1024;

/// One successful IPC poll. Values are absolute, as reported by the node;
/// no rate derivation is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IpcSnapshot {
    /// Pool inserts via local RPC.
    pub insert_owned_txs: u64,
    /// Pool inserts forwarded from peers.
    pub insert_forwarded_txs: u64,
    /// Drops: not well formed.
    pub drop_not_well_formed: u64,
    /// Drops: invalid signature.
    pub drop_invalid_signature: u64,
    /// Drops: nonce too low.
    pub drop_nonce_too_low: u64,
    /// Drops: fee too low.
    pub drop_fee_too_low: u64,
    /// Drops: insufficient balance.
    pub drop_insufficient_balance: u64,
    /// Drops: pool full.
    pub drop_pool_full: u64,
    /// Proposals created.
    pub create_proposal: u64,
    /// Transactions included in created proposals.
    pub create_proposal_txs: u64,
    /// Addresses with pending transactions.
    pub pending_addresses: u64,
    /// Transactions in the pending pool.
    pub pending_txs: u64,
    /// Transactions promoted into the pending pool.
    pub pending_promote_txs: u64,
    /// Addresses in the tracked pool.
    pub tracked_addresses: u64,
    /// Transactions in the tracked pool.
    pub tracked_txs: u64,
    /// Transactions executed on the parallel path.
    pub parallel_success: u64,
    /// Transactions that fell back to sequential execution.
    pub sequential_fallback: u64,
    /// State reads performed.
    pub state_reads: u64,
    /// State writes performed.
    pub state_writes: u64,
    /// When the snapshot was taken. `None` until the first success.
    pub last_updated: Option<Instant>,
}

#[derive(Debug, Default, Deserialize)]
struct PendingPool {
    #[serde(default)]
    addresses: u64,
    #[serde(default)]
    txs: u64,
    #[serde(default)]
    promote_txs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TrackedPool {
    #[serde(default)]
    addresses: u64,
    #[serde(default)]
    txs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TxPoolReply {
    #[serde(default)]
    insert_owned_txs: u64,
    #[serde(default)]
    insert_forwarded_txs: u64,
    #[serde(default)]
    drop_not_well_formed: u64,
    #[serde(default)]
    drop_invalid_signature: u64,
    #[serde(default)]
    drop_nonce_too_low: u64,
    #[serde(default)]
    drop_fee_too_low: u64,
    #[serde(default)]
    drop_insufficient_balance: u64,
    #[serde(default)]
    drop_pool_full: u64,
    #[serde(default)]
    create_proposal: u64,
    #[serde(default)]
    create_proposal_txs: u64,
    #[serde(default)]
    pending: PendingPool,
    #[serde(default)]
    tracked: TrackedPool,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionReply {
    #[serde(default)]
    parallel_success: u64,
    #[serde(default)]
    sequential_fallback: u64,
    #[serde(default)]
    state_reads: u64,
    #[serde(default)]
    state_writes: u64,
}

#[derive(Debug, Default, Deserialize)]
struct MetricsResult {
    #[serde(default)]
    txpool: TxPoolReply,
    #[serde(default)]
    execution: ExecutionReply,
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    result: MetricsResult,
}

/// Map a parsed reply onto a snapshot, stamped with `now`.
fn apply_reply(result: &MetricsResult, now: Instant) -> IpcSnapshot {
    IpcSnapshot {
        insert_owned_txs: result.txpool.insert_owned_txs,
        insert_forwarded_txs: result.txpool.insert_forwarded_txs,
        drop_not_well_formed: result.txpool.drop_not_well_formed,
        drop_invalid_signature: result.txpool.drop_invalid_signature,
        drop_nonce_too_low: result.txpool.drop_nonce_too_low,
        drop_fee_too_low: result.txpool.drop_fee_too_low,
        drop_insufficient_balance: result.txpool.drop_insufficient_balance,
        drop_pool_full: result.txpool.drop_pool_full,
        create_proposal: result.txpool.create_proposal,
        create_proposal_txs: result.txpool.create_proposal_txs,
        pending_addresses: result.txpool.pending.addresses,
        pending_txs: result.txpool.pending.txs,
        pending_promote_txs: result.txpool.pending.promote_txs,
        tracked_addresses: result.txpool.tracked.addresses,
        tracked_txs: result.txpool.tracked.txs,
        parallel_success: result.execution.parallel_success,
        sequential_fallback: result.execution.sequential_fallback,
        state_reads: result.execution.state_reads,
        state_writes: result.execution.state_writes,
        last_updated: Some(now),
    }
}

/// Periodic collector for the node's mempool IPC socket.
pub struct IpcCollector {
    path: PathBuf,
    snapshot: RwLock<IpcSnapshot>,
}

impl IpcCollector {
    /// Create a collector for the given socket path. Nothing is dialed yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(IpcSnapshot::default()),
        }
    }

    /// Run the first poll, then begin background collection.
    ///
    /// The first poll's error is returned without starting the background
    /// task, so the caller can fall back to estimation.
    pub async fn start(self: Arc<Self>) -> Result<(), CollectorError> {
        self.poll_once().await?;

        let collector = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = collector.poll_once().await {
                    monpulse_metrics::collectors::IPC_FAILURES.inc();
                    warn!(error = %err, "ipc poll failed");
                }
            }
        });

        Ok(())
    }

    async fn poll_once(&self) -> Result<(), CollectorError> {
        let result = request_metrics(&self.path).await?;
        let snapshot = apply_reply(&result, Instant::now());

        debug!(
            rpc = snapshot.insert_owned_txs,
            p2p = snapshot.insert_forwarded_txs,
            sig_failed = snapshot.drop_invalid_signature,
            parallel = snapshot.parallel_success,
            "updated ipc metrics"
        );

        *self.snapshot.write() = snapshot;
        Ok(())
    }

    /// Copy of the latest snapshot.
    pub fn snapshot(&self) -> IpcSnapshot {
        *self.snapshot.read()
    }

    /// True when the last successful poll is within the freshness window.
    pub fn is_healthy(&self) -> bool {
        self.snapshot
            .read()
            .last_updated
            .map(|t| t.elapsed() < FRESHNESS_WINDOW)
            .unwrap_or(false)
    }
}

/// One request/reply cycle over a fresh connection.
async fn request_metrics(path: &Path) -> Result<MetricsResult, CollectorError> {
    let mut stream = UnixStream::connect(path).await?;

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "monad_getMetrics",
        "params": [],
    });
    let mut payload = serde_json::to_vec(&request)?;
    payload.push(b'\n');

    timeout(IO_TIMEOUT, stream.write_all(&payload))
        .await
        .map_err(|_| CollectorError::Timeout("ipc write"))??;

    let mut buffer = vec![0u8; REPLY_BUFFER_SIZE];
    let read = timeout(IO_TIMEOUT, stream.read(&mut buffer))
        .await
        .map_err(|_| CollectorError::Timeout("ipc read"))??;

    let response: MetricsResponse = serde_json::from_slice(&buffer[..read])?;
    Ok(response.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_parsing_maps_all_fields() {
        let reply = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "txpool": {
                    "insert_owned_txs": 10,
                    "insert_forwarded_txs": 20,
                    "drop_invalid_signature": 3,
                    "drop_nonce_too_low": 2,
                    "drop_fee_too_low": 1,
                    "drop_insufficient_balance": 4,
                    "drop_pool_full": 5,
                    "create_proposal": 6,
                    "create_proposal_txs": 60,
                    "pending": {"addresses": 7, "txs": 70, "promote_txs": 17},
                    "tracked": {"addresses": 8, "txs": 80}
                },
                "execution": {
                    "parallel_success": 90,
                    "sequential_fallback": 9,
                    "state_reads": 300,
                    "state_writes": 100
                }
            }
        }"#;

        let response: MetricsResponse = serde_json::from_str(reply).unwrap();
        let snapshot = apply_reply(&response.result, Instant::now());

        assert_eq!(snapshot.insert_owned_txs, 10);
        assert_eq!(snapshot.insert_forwarded_txs, 20);
        assert_eq!(snapshot.drop_pool_full, 5);
        assert_eq!(snapshot.pending_txs, 70);
        assert_eq!(snapshot.tracked_addresses, 8);
        assert_eq!(snapshot.parallel_success, 90);
        assert_eq!(snapshot.state_writes, 100);
        assert!(snapshot.last_updated.is_some());
    }

    #[test]
    fn test_reply_parsing_tolerates_missing_sections() {
        let response: MetricsResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        let snapshot = apply_reply(&response.result, Instant::now());
        assert_eq!(snapshot.insert_owned_txs, 0);
        assert_eq!(snapshot.parallel_success, 0);
    }

    #[test]
    fn test_fresh_collector_is_unhealthy() {
        let collector = IpcCollector::new("/tmp/nonexistent.sock");
        assert!(!collector.is_healthy());
    }
}
