//! Source-priority waterfall generation.

use std::time::{SystemTime, UNIX_EPOCH};

use monpulse_collectors::{IpcSnapshot, PrometheusSnapshot};
use monpulse_consensus::ConsensusStateSummary;
use monpulse_types::BlockHeader;

use crate::graph::{
    WaterfallDrops, WaterfallGraph, WaterfallLink, WaterfallMetadata, WaterfallNode,
    WaterfallSource,
};

/// Rate-to-count conversion interval, matching the scrape period.
pub const INTERVAL_SECONDS: f64 = 5.0;

/// Nominal block time used for per-interval block counts.
const BLOCK_TIME_SECS: f64 = 0.4;

/// Inputs to one generation pass.
///
/// The gateway fills each field only when the corresponding collector is
/// healthy, so source selection is a plain walk over the options and the
/// priority logic is testable without live collectors.
#[derive(Debug, Clone, Default)]
pub struct WaterfallInputs {
    /// Latest Prometheus snapshot, when the collector is healthy.
    pub prometheus: Option<PrometheusSnapshot>,
    /// Latest IPC snapshot, when the collector is healthy.
    pub ipc: Option<IpcSnapshot>,
    /// Latest observed block, when the subscriber is connected.
    pub latest_block: Option<BlockHeader>,
    /// Consensus tracker summary.
    pub consensus: ConsensusStateSummary,
}

/// The eleven canonical lifecycle nodes.
fn canonical_nodes() -> Vec<WaterfallNode> {
    vec![
        WaterfallNode { id: "submission_rpc", label: "RPC", color: "#4CAF50" },
        WaterfallNode { id: "submission_p2p", label: "P2P", color: "#2196F3" },
        WaterfallNode { id: "mempool", label: "Mempool", color: "#FF9800" },
        WaterfallNode { id: "block_building", label: "Block Building", color: "#9C27B0" },
        WaterfallNode { id: "consensus_proposed", label: "Proposed", color: "#3F51B5" },
        WaterfallNode { id: "consensus_voted", label: "Voted", color: "#FFC107" },
        WaterfallNode { id: "consensus_finalized", label: "Finalized", color: "#4CAF50" },
        WaterfallNode { id: "execution", label: "Execution", color: "#F44336" },
        WaterfallNode { id: "state_update", label: "State Update", color: "#00BCD4" },
        WaterfallNode { id: "finality", label: "Final (Queryable)", color: "#8BC34A" },
        WaterfallNode { id: "dropped", label: "Dropped", color: "#757575" },
    ]
}

fn push_link(links: &mut Vec<WaterfallLink>, source: &'static str, target: &'static str, value: i64) {
    if value > 0 {
        links.push(WaterfallLink { source, target, value });
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Generate the lifecycle graph from the highest-fidelity source available.
///
/// Priority: Prometheus (healthy, with a non-zero commits rate and at least
/// one active insert rate) → IPC (healthy) → block estimation (subscriber
/// connected with a latest block) → mock constants.
pub fn generate(inputs: &WaterfallInputs) -> WaterfallGraph {
    if let Some(prometheus) = &inputs.prometheus {
        // A live commits rate with dead txpool counters would produce an
        // inconsistent graph; fall through instead.
        if prometheus.tps > 0.0
            && (prometheus.insert_owned_rate > 0.0 || prometheus.insert_forwarded_rate > 0.0)
        {
            return from_prometheus(prometheus, inputs.consensus.clone());
        }
    }
    if let Some(ipc) = &inputs.ipc {
        return from_ipc(ipc, inputs.consensus.clone());
    }
    if let Some(block) = &inputs.latest_block {
        return from_block(block, inputs.consensus.clone());
    }
    mock(inputs.consensus.clone())
}

/// Shared stage arithmetic: per-interval counts in, graph out.
#[allow(clippy::too_many_arguments)]
fn build_stage_graph(
    rpc_received: i64,
    p2p_received: i64,
    invalid_sig: i64,
    nonce_invalid: i64,
    insufficient_balance: i64,
    block_full: i64,
    fee_too_low: i64,
) -> (Vec<WaterfallLink>, WaterfallDrops) {
    let to_mempool = rpc_received + p2p_received - invalid_sig;
    let to_block_building = to_mempool - nonce_invalid;
    let to_consensus = to_block_building - insufficient_balance - block_full - fee_too_low;

    let mut links = Vec::new();
    push_link(&mut links, "submission_rpc", "mempool", rpc_received);
    push_link(&mut links, "submission_p2p", "mempool", p2p_received);
    push_link(&mut links, "mempool", "block_building", to_block_building);
    push_link(&mut links, "mempool", "dropped", invalid_sig + nonce_invalid);
    push_link(&mut links, "block_building", "consensus_proposed", to_consensus);
    push_link(
        &mut links,
        "block_building",
        "dropped",
        insufficient_balance + block_full + fee_too_low,
    );
    push_link(&mut links, "consensus_proposed", "consensus_voted", to_consensus);
    push_link(&mut links, "consensus_voted", "consensus_finalized", to_consensus);
    push_link(&mut links, "consensus_finalized", "execution", to_consensus);
    push_link(&mut links, "execution", "state_update", to_consensus);
    push_link(&mut links, "state_update", "finality", to_consensus);

    let drops = WaterfallDrops {
        invalid_signature: invalid_sig,
        nonce_invalid,
        insufficient_balance,
        block_full,
        fee_too_low,
    };
    (links, drops)
}

fn from_prometheus(
    metrics: &PrometheusSnapshot,
    consensus: ConsensusStateSummary,
) -> WaterfallGraph {
    let interval = INTERVAL_SECONDS;
    let (links, drops) = build_stage_graph(
        (metrics.insert_owned_rate * interval) as i64,
        (metrics.insert_forwarded_rate * interval) as i64,
        (metrics.drop_invalid_signature_rate * interval) as i64,
        (metrics.drop_nonce_too_low_rate * interval) as i64,
        (metrics.drop_insufficient_balance_rate * interval) as i64,
        (metrics.drop_pool_full_rate * interval) as i64,
        (metrics.drop_fee_too_low_rate * interval) as i64,
    );

    let mut metadata = WaterfallMetadata::bare(WaterfallSource::PrometheusMetrics, consensus);
    metadata.last_updated = Some(unix_now());
    metadata.tps = Some(metrics.tps);
    metadata.pending_txs = Some(metrics.pending_txs as i64);
    metadata.tracked_txs = Some(metrics.tracked_txs as i64);
    metadata.interval_seconds = Some(interval);

    WaterfallGraph {
        nodes: canonical_nodes(),
        links,
        metadata,
        drops: Some(drops),
    }
}

fn from_ipc(metrics: &IpcSnapshot, consensus: ConsensusStateSummary) -> WaterfallGraph {
    let (links, drops) = build_stage_graph(
        metrics.insert_owned_txs as i64,
        metrics.insert_forwarded_txs as i64,
        metrics.drop_invalid_signature as i64,
        metrics.drop_nonce_too_low as i64,
        metrics.drop_insufficient_balance as i64,
        metrics.drop_pool_full as i64,
        metrics.drop_fee_too_low as i64,
    );

    let mut metadata = WaterfallMetadata::bare(WaterfallSource::RealIpcMetrics, consensus);
    metadata.last_updated = Some(unix_now());
    metadata.pending_txs = Some(metrics.pending_txs as i64);
    metadata.tracked_txs = Some(metrics.tracked_txs as i64);

    WaterfallGraph {
        nodes: canonical_nodes(),
        links,
        metadata,
        drops: Some(drops),
    }
}

fn from_block(block: &BlockHeader, consensus: ConsensusStateSummary) -> WaterfallGraph {
    let tx_count = block.tx_count as i64;

    // Conservative 50/50 source split with small fixed drop ratios.
    let rpc_received = tx_count * 5 / 10;
    let p2p_received = tx_count * 5 / 10;
    let total = rpc_received + p2p_received;
    let invalid_sig = total / 100; // 1%
    let nonce_invalid = total / 200; // 0.5%
    let insufficient_balance = total / 500; // 0.2%

    let (links, drops) = build_stage_graph(
        rpc_received,
        p2p_received,
        invalid_sig,
        nonce_invalid,
        insufficient_balance,
        0,
        0,
    );

    let mut metadata = WaterfallMetadata::bare(WaterfallSource::BlockEstimation, consensus);
    metadata.block_height = Some(block.number);
    metadata.block_hash = Some(block.hash.clone());
    metadata.block_txs = Some(block.tx_count);
    metadata.timestamp = Some(block.timestamp);

    WaterfallGraph {
        nodes: canonical_nodes(),
        links,
        metadata,
        drops: Some(drops),
    }
}

fn mock(consensus: ConsensusStateSummary) -> WaterfallGraph {
    let mut links = Vec::new();
    push_link(&mut links, "submission_rpc", "mempool", 700);
    push_link(&mut links, "submission_p2p", "mempool", 300);
    push_link(&mut links, "mempool", "block_building", 950);
    push_link(&mut links, "mempool", "dropped", 50);
    push_link(&mut links, "block_building", "consensus_proposed", 930);
    push_link(&mut links, "block_building", "dropped", 20);
    push_link(&mut links, "consensus_proposed", "consensus_voted", 930);
    push_link(&mut links, "consensus_voted", "consensus_finalized", 930);
    push_link(&mut links, "consensus_finalized", "execution", 930);
    push_link(&mut links, "execution", "state_update", 925);
    push_link(&mut links, "execution", "dropped", 5);
    push_link(&mut links, "state_update", "finality", 925);

    WaterfallGraph {
        nodes: canonical_nodes(),
        links,
        metadata: WaterfallMetadata::bare(WaterfallSource::MockData, consensus),
        drops: None,
    }
}

/// Per-interval block count implied by the nominal block time.
pub(crate) fn blocks_per_interval() -> i64 {
    (INTERVAL_SECONDS / BLOCK_TIME_SECS) as i64
}
