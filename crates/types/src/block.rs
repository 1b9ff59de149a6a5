//! Block headers and transaction log events as observed upstream.

use serde::{Deserialize, Serialize};

/// A block header observed on the upstream `newHeads` subscription.
///
/// The subscription payload does not carry a transaction count; `tx_count`
/// starts at whatever the payload exposes (usually zero) and is set once by
/// the enrichment fetch. Headers are never mutated after enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number, strictly increasing in steady state.
    pub number: u64,
    /// Hex-encoded block hash, kept in wire form.
    pub hash: String,
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
    /// Transaction count, filled by enrichment.
    #[serde(rename = "transactionCount")]
    pub tx_count: u64,
    /// Gas used by the block.
    #[serde(rename = "gasUsed")]
    pub gas_used: u64,
}

impl BlockHeader {
    /// Shortened hash for log lines (`0x1234abcd…`).
    pub fn short_hash(&self) -> &str {
        let end = self.hash.len().min(10);
        &self.hash[..end]
    }
}

/// Timestamp and transaction count of one recent block, the unit of the
/// subscriber's TPS window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTxInfo {
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
    /// Transactions in the block.
    pub tx_count: u64,
}

/// A transaction log event from the upstream `monadLogs` subscription.
///
/// Fields are kept in wire form; the gateway forwards these to clients
/// without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog {
    /// Emitting contract address.
    pub address: String,
    /// Log topics.
    #[serde(default)]
    pub topics: Vec<String>,
    /// ABI-encoded log data.
    #[serde(default)]
    pub data: String,
    /// Block number the log was emitted in, hex-encoded.
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    /// Hash of the emitting transaction.
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
    /// Index of the log within the block.
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_truncates() {
        let header = BlockHeader {
            number: 1,
            hash: "0xdeadbeefcafebabe".to_string(),
            timestamp: 0,
            tx_count: 0,
            gas_used: 0,
        };
        assert_eq!(header.short_hash(), "0xdeadbeef");
    }

    #[test]
    fn test_short_hash_handles_short_input() {
        let header = BlockHeader {
            number: 1,
            hash: "0xab".to_string(),
            timestamp: 0,
            tx_count: 0,
            gas_used: 0,
        };
        assert_eq!(header.short_hash(), "0xab");
    }

    #[test]
    fn test_transaction_log_tolerates_missing_fields() {
        let log: TransactionLog = serde_json::from_str(r#"{"address": "0x1"}"#).unwrap();
        assert_eq!(log.address, "0x1");
        assert!(log.topics.is_empty());
        assert!(log.block_number.is_none());
    }
}
