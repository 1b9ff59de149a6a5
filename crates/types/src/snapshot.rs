//! The fused metrics snapshot the gateway broadcasts from.
//!
//! One writable cell holds the most recent fused view; it is rebuilt by the
//! block-processing loop on every enriched block and copied by readers.

use serde::{Deserialize, Serialize};

/// Identity and liveness information about the observed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Gateway version string.
    pub version: String,
    /// Chain id of the observed network.
    pub chain_id: u64,
    /// Display name of the node, from its local configuration.
    pub node_name: String,
    /// Coarse status label.
    pub status: String,
    /// Seconds since the gateway started.
    pub uptime: u64,
}

/// Consensus-side view derived from the latest observed block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStats {
    /// Height of the latest observed block.
    pub current_height: u64,
    /// Timestamp of the latest block, unix seconds.
    pub last_block_time: u64,
    /// Nominal block time in seconds.
    pub block_time: f64,
    /// Active validator count.
    pub validator_count: u64,
    /// Total voting power.
    pub voting_power: u64,
    /// Fraction of validators participating.
    pub participation_rate: f64,
}

/// Execution-side view derived from the latest block and the TPS window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Transactions per second over the recent-blocks window.
    pub tps: f64,
    /// Transactions waiting in the pool.
    pub pending_tx_count: u64,
    /// Fraction of transactions executed on the parallel path.
    pub parallel_success_rate: f64,
    /// Average gas price in gwei.
    pub avg_gas_price: u64,
    /// Average execution time per transaction, milliseconds.
    pub avg_execution_time: f64,
    /// Approximate state size in bytes.
    pub state_size: u64,
}

/// Network-side view. The upstream exposes no standard network endpoint, so
/// these carry configured defaults until a real source exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Connected peer count.
    pub peer_count: u64,
    /// Inbound peer count.
    pub inbound_peers: u64,
    /// Outbound peer count.
    pub outbound_peers: u64,
    /// Bytes received.
    pub bytes_in: u64,
    /// Bytes sent.
    pub bytes_out: u64,
    /// Estimated network latency, milliseconds.
    pub network_latency: f64,
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self {
            peer_count: 50,
            inbound_peers: 25,
            outbound_peers: 25,
            bytes_in: 1_000_000,
            bytes_out: 1_000_000,
            network_latency: 50.0,
        }
    }
}

/// Per-stage totals backing the legacy `/api/v1/waterfall` view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallStageTotals {
    /// Transactions received over RPC.
    pub rpc_received: u64,
    /// Transactions received over gossip.
    pub gossip_received: u64,
    /// Current mempool size.
    pub mempool_size: u64,
    /// Dropped: signature verification failed.
    pub signature_failed: u64,
    /// Dropped: duplicate or stale nonce.
    pub nonce_duplicate: u64,
    /// Dropped: invalid gas parameters.
    pub gas_invalid: u64,
    /// Dropped: insufficient balance.
    pub balance_insufficient: u64,
    /// Executed on the parallel path.
    pub evm_parallel_executed: u64,
    /// Executed on the sequential fallback path.
    pub evm_sequential_fallback: u64,
    /// Total gas used.
    pub gas_used_total: u64,
    /// State access conflicts during parallel execution.
    pub state_conflicts: u64,
    /// Blocks proposed.
    pub bft_proposed: u64,
    /// Blocks voted.
    pub bft_voted: u64,
    /// Blocks committed.
    pub bft_committed: u64,
    /// State updates persisted.
    pub state_updated: u64,
    /// Trie database writes.
    pub triedb_written: u64,
    /// Blocks broadcast to peers.
    pub blocks_broadcast: u64,
}

/// The process-wide fused view composed by the block-processing loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSnapshot {
    /// Snapshot timestamp, unix seconds. Never decreases across updates.
    pub timestamp: u64,
    /// Node identity and liveness.
    pub node_info: NodeInfo,
    /// Stage totals for the legacy waterfall view.
    pub waterfall: WaterfallStageTotals,
    /// Consensus-side stats.
    pub consensus: ConsensusStats,
    /// Execution-side stats.
    pub execution: ExecutionStats,
    /// Network-side stats.
    pub network: NetworkStats,
}

impl Default for FusedSnapshot {
    fn default() -> Self {
        Self {
            timestamp: 0,
            node_info: NodeInfo {
                version: "0.1.0".to_string(),
                chain_id: 20143,
                node_name: "Monad Node".to_string(),
                status: "starting".to_string(),
                uptime: 0,
            },
            waterfall: WaterfallStageTotals::default(),
            consensus: ConsensusStats {
                current_height: 0,
                last_block_time: 0,
                block_time: 0.4,
                validator_count: 100,
                voting_power: 1_000_000,
                participation_rate: 0.9,
            },
            execution: ExecutionStats {
                tps: 0.0,
                pending_tx_count: 0,
                parallel_success_rate: 0.85,
                avg_gas_price: 21,
                avg_execution_time: 5.0,
                state_size: 1_000_000_000,
            },
            network: NetworkStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_round_trips() {
        let snapshot = FusedSnapshot::default();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: FusedSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn test_default_network_stats() {
        let network = NetworkStats::default();
        assert_eq!(network.peer_count, 50);
        assert_eq!(network.inbound_peers + network.outbound_peers, 50);
    }
}
