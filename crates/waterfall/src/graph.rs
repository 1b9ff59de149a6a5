//! Waterfall graph shapes.

use monpulse_consensus::ConsensusStateSummary;
use serde::{Deserialize, Serialize};

/// Which collector produced a waterfall output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterfallSource {
    /// Derived from Prometheus counter rates.
    PrometheusMetrics,
    /// Derived from absolute IPC counters.
    RealIpcMetrics,
    /// Estimated from the latest block's transaction count.
    BlockEstimation,
    /// Fixed fallback constants.
    MockData,
}

/// A stage node in the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaterfallNode {
    /// Stable node id referenced by links.
    pub id: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Suggested display color.
    pub color: &'static str,
}

/// A flow between two stage nodes. Never emitted with `value <= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaterfallLink {
    /// Source node id.
    pub source: &'static str,
    /// Target node id.
    pub target: &'static str,
    /// Transactions flowing along this edge in the current interval.
    pub value: i64,
}

/// Per-reason drop accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaterfallDrops {
    /// Dropped: invalid signature.
    pub invalid_signature: i64,
    /// Dropped: nonce too low or duplicate.
    pub nonce_invalid: i64,
    /// Dropped: insufficient balance.
    pub insufficient_balance: i64,
    /// Dropped: pool or block full.
    pub block_full: i64,
    /// Dropped: fee below threshold.
    pub fee_too_low: i64,
}

impl WaterfallDrops {
    /// Sum of all drop reasons.
    pub fn total(&self) -> i64 {
        self.invalid_signature
            + self.nonce_invalid
            + self.insufficient_balance
            + self.block_full
            + self.fee_too_low
    }
}

/// Metadata attached to every waterfall output. `source` is the ground-truth
/// signal for which upstream is live.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallMetadata {
    /// Which collector produced this output.
    pub source: WaterfallSource,
    /// When the source data was last refreshed, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<u64>,
    /// Transactions per second reported by the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
    /// Pending-pool size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_txs: Option<i64>,
    /// Tracked-pool size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_txs: Option<i64>,
    /// Rate-to-count conversion interval, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<f64>,
    /// Block height, for block-estimation outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    /// Block hash, for block-estimation outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    /// Block transaction count, for block-estimation outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_txs: Option<u64>,
    /// Block timestamp, for block-estimation outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Consensus tracker summary at generation time.
    pub consensus_state: ConsensusStateSummary,
}

impl WaterfallMetadata {
    /// Metadata carrying only a source tag and consensus summary.
    pub fn bare(source: WaterfallSource, consensus_state: ConsensusStateSummary) -> Self {
        Self {
            source,
            last_updated: None,
            tps: None,
            pending_txs: None,
            tracked_txs: None,
            interval_seconds: None,
            block_height: None,
            block_hash: None,
            block_txs: None,
            timestamp: None,
            consensus_state,
        }
    }
}

/// The full lifecycle graph: nodes, links, metadata and drop accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallGraph {
    /// Stage nodes.
    pub nodes: Vec<WaterfallNode>,
    /// Flows between stages. Zero- and negative-valued edges are omitted.
    pub links: Vec<WaterfallLink>,
    /// Source and context.
    pub metadata: WaterfallMetadata,
    /// Per-reason drop accounting, when the source exposes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drops: Option<WaterfallDrops>,
}
