//! Typed JSON-RPC client for one-off calls to the upstream node.
//!
//! Used for block enrichment (the `newHeads` payload carries no transaction
//! count) and for the per-tick consensus view the broadcast loop composes.

use std::time::Duration;

use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use tracing::warn;

use monpulse_types::hex::opt_u64_quantity;
use monpulse_types::{parse_hex_u64, BlockHeader, ConsensusStats};

use crate::error::CollectorError;

/// Blocks per epoch on the observed network.
pub const BLOCKS_PER_EPOCH: u64 = 50_000;

/// Nominal block time in seconds.
pub const BLOCK_TIME_SECS: f64 = 0.4;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A block as returned by `eth_getBlockByNumber`.
#[derive(Debug, Deserialize)]
struct RpcBlock {
    #[serde(default, deserialize_with = "opt_u64_quantity::deserialize")]
    number: Option<u64>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default, deserialize_with = "opt_u64_quantity::deserialize")]
    timestamp: Option<u64>,
    #[serde(rename = "gasUsed", default, deserialize_with = "opt_u64_quantity::deserialize")]
    gas_used: Option<u64>,
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

/// JSON-RPC client for the upstream node's HTTP endpoint.
pub struct NodeRpcClient {
    client: HttpClient,
}

impl NodeRpcClient {
    /// Build a client for the given URL. No connection is made until the
    /// first request.
    pub fn new(url: &str) -> Result<Self, CollectorError> {
        let client = HttpClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url)?;
        Ok(Self { client })
    }

    /// Transaction count of block `number`, via `eth_getBlockByNumber` with
    /// hashes-only transactions.
    pub async fn block_tx_count(&self, number: u64) -> Result<u64, CollectorError> {
        let block: Option<RpcBlock> = self
            .client
            .request(
                "eth_getBlockByNumber",
                rpc_params![format!("{number:#x}"), false],
            )
            .await?;
        Ok(block.map(|b| b.transactions.len() as u64).unwrap_or(0))
    }

    /// The latest block as a [`BlockHeader`], if the node has one.
    pub async fn latest_block(&self) -> Result<Option<BlockHeader>, CollectorError> {
        let block: Option<RpcBlock> = self
            .client
            .request("eth_getBlockByNumber", rpc_params!["latest", false])
            .await?;
        Ok(block.and_then(|b| {
            Some(BlockHeader {
                number: b.number?,
                hash: b.hash.unwrap_or_default(),
                timestamp: b.timestamp.unwrap_or(0),
                tx_count: b.transactions.len() as u64,
                gas_used: b.gas_used.unwrap_or(0),
            })
        }))
    }

    /// Consensus-side stats built from the latest block.
    ///
    /// Validator count, voting power and participation have no standard
    /// endpoint upstream; fixed defaults are reported until one exists.
    pub async fn consensus_stats(&self) -> Result<ConsensusStats, CollectorError> {
        let block = self
            .latest_block()
            .await?
            .ok_or_else(|| CollectorError::Malformed("node returned no latest block".into()))?;

        Ok(ConsensusStats {
            current_height: block.number,
            last_block_time: block.timestamp,
            block_time: BLOCK_TIME_SECS,
            validator_count: 100,
            voting_power: 1_000_000,
            participation_rate: 0.9,
        })
    }

    /// Number of pending transactions; zero when the call fails (the
    /// endpoint is optional upstream).
    pub async fn pending_tx_count(&self) -> u64 {
        let pending: Result<Vec<serde_json::Value>, _> = self
            .client
            .request("eth_pendingTransactions", rpc_params![])
            .await;
        match pending {
            Ok(txs) => txs.len() as u64,
            Err(err) => {
                warn!(error = %err, "eth_pendingTransactions unavailable");
                0
            }
        }
    }

    /// Current epoch, derived from the chain head height.
    pub async fn current_epoch(&self) -> Result<u64, CollectorError> {
        let head: String = self.client.request("eth_blockNumber", rpc_params![]).await?;
        let height =
            parse_hex_u64(&head).map_err(|e| CollectorError::Malformed(e.to_string()))?;
        Ok(height / BLOCKS_PER_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_block_tolerates_pending_block_shape() {
        // Pending blocks report null number/hash.
        let block: RpcBlock = serde_json::from_str(
            r#"{"number": null, "hash": null, "timestamp": "0x64", "transactions": [{}, {}]}"#,
        )
        .unwrap();
        assert_eq!(block.number, None);
        assert_eq!(block.timestamp, Some(100));
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.gas_used, None);
    }

    #[test]
    fn test_rpc_block_parses_quantities() {
        let block: RpcBlock = serde_json::from_str(
            r#"{"number": "0x1b4", "hash": "0xabc", "timestamp": "0x5f5e100", "gasUsed": "0x5208", "transactions": []}"#,
        )
        .unwrap();
        assert_eq!(block.number, Some(436));
        assert_eq!(block.gas_used, Some(21000));
        assert_eq!(block.hash.as_deref(), Some("0xabc"));
    }
}
