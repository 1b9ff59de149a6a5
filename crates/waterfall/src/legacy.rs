//! Backward-compatible flat waterfall shape.
//!
//! The original dashboard consumed a flat `{in, out}` key schema; it is kept
//! as a presentation adapter computed from the same source selection and
//! stage numbers as the graph shape.

use monpulse_collectors::{IpcSnapshot, PrometheusSnapshot};
use monpulse_types::BlockHeader;
use serde::Serialize;

use crate::generator::{blocks_per_interval, WaterfallInputs, INTERVAL_SECONDS};
use crate::graph::{WaterfallMetadata, WaterfallSource};

/// Ingress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LegacyIn {
    /// Received via local RPC.
    pub rpc: i64,
    /// Received via peer forwarding.
    pub p2p: i64,
    /// Alias of `p2p` kept for the old frontend.
    pub gossip: i64,
}

/// Per-stage outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LegacyOut {
    /// Signature verification failures.
    pub verify_failed: i64,
    /// Nonce failures.
    pub nonce_failed: i64,
    /// Balance failures.
    pub balance_failed: i64,
    /// Dropped from the pool for low fees.
    pub pool_fee_dropped: i64,
    /// Dropped because the pool was full.
    pub pool_full: i64,
    /// Executed on the parallel path.
    pub exec_parallel: i64,
    /// Executed on the sequential fallback path.
    pub exec_sequential: i64,
    /// Execution failures.
    pub exec_failed: i64,
    /// State reads performed.
    pub state_reads: i64,
    /// State writes performed.
    pub state_writes: i64,
    /// Logs emitted.
    pub logs_emitted: i64,
    /// Blocks proposed in the interval.
    pub block_proposed: i64,
    /// Blocks finalized in the interval.
    pub block_finalized: i64,
}

/// The flat legacy waterfall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyWaterfall {
    /// Ingress counters.
    #[serde(rename = "in")]
    pub ingress: LegacyIn,
    /// Per-stage outcome counters.
    pub out: LegacyOut,
    /// Source and context, shared with the graph shape.
    pub metadata: WaterfallMetadata,
}

/// Generate the flat legacy shape with the same source priority as
/// [`crate::generate`].
pub fn generate_legacy(inputs: &WaterfallInputs) -> LegacyWaterfall {
    if let Some(prometheus) = &inputs.prometheus {
        if prometheus.tps > 0.0
            && (prometheus.insert_owned_rate > 0.0 || prometheus.insert_forwarded_rate > 0.0)
        {
            return legacy_from_prometheus(prometheus, inputs);
        }
    }
    if let Some(ipc) = &inputs.ipc {
        return legacy_from_ipc(ipc, inputs);
    }
    if let Some(block) = &inputs.latest_block {
        return legacy_from_block(block, inputs);
    }
    legacy_mock(inputs)
}

fn legacy_from_prometheus(metrics: &PrometheusSnapshot, inputs: &WaterfallInputs) -> LegacyWaterfall {
    let interval = INTERVAL_SECONDS;
    let successful = (metrics.tps * interval) as i64;

    let ingress = LegacyIn {
        rpc: (metrics.insert_owned_rate * interval) as i64,
        p2p: (metrics.insert_forwarded_rate * interval) as i64,
        gossip: (metrics.insert_forwarded_rate * interval) as i64,
    };
    let out = LegacyOut {
        verify_failed: (metrics.drop_invalid_signature_rate * interval) as i64,
        nonce_failed: (metrics.drop_nonce_too_low_rate * interval) as i64,
        balance_failed: (metrics.drop_insufficient_balance_rate * interval) as i64,
        pool_fee_dropped: (metrics.drop_fee_too_low_rate * interval) as i64,
        pool_full: (metrics.drop_pool_full_rate * interval) as i64,
        exec_parallel: (successful as f64 * 0.85) as i64,
        exec_sequential: (successful as f64 * 0.15) as i64,
        exec_failed: 0,
        state_reads: successful * 3,
        state_writes: successful,
        logs_emitted: successful / 3,
        block_proposed: blocks_per_interval(),
        block_finalized: blocks_per_interval(),
    };

    let mut metadata =
        WaterfallMetadata::bare(WaterfallSource::PrometheusMetrics, inputs.consensus.clone());
    metadata.tps = Some(metrics.tps);
    metadata.pending_txs = Some(metrics.pending_txs as i64);
    metadata.tracked_txs = Some(metrics.tracked_txs as i64);
    metadata.interval_seconds = Some(interval);

    LegacyWaterfall { ingress, out, metadata }
}

fn legacy_from_ipc(metrics: &IpcSnapshot, inputs: &WaterfallInputs) -> LegacyWaterfall {
    let ingress = LegacyIn {
        rpc: metrics.insert_owned_txs as i64,
        p2p: metrics.insert_forwarded_txs as i64,
        gossip: metrics.insert_forwarded_txs as i64,
    };
    let out = LegacyOut {
        verify_failed: metrics.drop_invalid_signature as i64,
        nonce_failed: metrics.drop_nonce_too_low as i64,
        balance_failed: metrics.drop_insufficient_balance as i64,
        pool_fee_dropped: metrics.drop_fee_too_low as i64,
        pool_full: metrics.drop_pool_full as i64,
        exec_parallel: metrics.parallel_success as i64,
        exec_sequential: metrics.sequential_fallback as i64,
        exec_failed: 0,
        state_reads: metrics.state_reads as i64,
        state_writes: metrics.state_writes as i64,
        logs_emitted: (metrics.state_writes / 3) as i64,
        block_proposed: metrics.create_proposal as i64,
        block_finalized: metrics.create_proposal as i64,
    };

    let mut metadata =
        WaterfallMetadata::bare(WaterfallSource::RealIpcMetrics, inputs.consensus.clone());
    metadata.pending_txs = Some(metrics.pending_txs as i64);
    metadata.tracked_txs = Some(metrics.tracked_txs as i64);

    LegacyWaterfall { ingress, out, metadata }
}

fn legacy_from_block(block: &BlockHeader, inputs: &WaterfallInputs) -> LegacyWaterfall {
    let tx_count = block.tx_count as i64;
    let rpc = tx_count * 5 / 10;
    let p2p = tx_count * 5 / 10;
    let total = rpc + p2p;

    let verify_failed = total / 100; // 1%
    let nonce_failed = total / 200; // 0.5%
    let balance_failed = total / 500; // 0.2%
    let verified = total - verify_failed - nonce_failed - balance_failed;

    let queued = verified * 8 / 10;
    let promoted = queued * 9 / 10;
    let fee_dropped = queued / 20;
    let selected = promoted;

    let ingress = LegacyIn { rpc, p2p, gossip: p2p };
    let out = LegacyOut {
        verify_failed,
        nonce_failed,
        balance_failed,
        pool_fee_dropped: fee_dropped,
        pool_full: 0,
        exec_parallel: selected * 85 / 100,
        exec_sequential: selected * 15 / 100,
        exec_failed: 0,
        state_reads: selected * 3,
        state_writes: selected,
        logs_emitted: selected / 3,
        block_proposed: 1,
        block_finalized: 1,
    };

    let mut metadata =
        WaterfallMetadata::bare(WaterfallSource::BlockEstimation, inputs.consensus.clone());
    metadata.block_height = Some(block.number);
    metadata.block_hash = Some(block.hash.clone());
    metadata.block_txs = Some(block.tx_count);
    metadata.timestamp = Some(block.timestamp);

    LegacyWaterfall { ingress, out, metadata }
}

fn legacy_mock(inputs: &WaterfallInputs) -> LegacyWaterfall {
    LegacyWaterfall {
        ingress: LegacyIn { rpc: 1400, p2p: 600, gossip: 600 },
        out: LegacyOut {
            verify_failed: 100,
            nonce_failed: 40,
            balance_failed: 20,
            pool_fee_dropped: 50,
            pool_full: 0,
            exec_parallel: 1530,
            exec_sequential: 270,
            exec_failed: 0,
            state_reads: 5400,
            state_writes: 1800,
            logs_emitted: 600,
            block_proposed: 1,
            block_finalized: 1,
        },
        metadata: WaterfallMetadata::bare(WaterfallSource::MockData, inputs.consensus.clone()),
    }
}
