//! Wire protocol for browser clients.
//!
//! Every frame is a JSON object `{topic, key, value?, id?}`. The key names
//! and value shapes mirror the Firedancer dashboard protocol the frontend
//! already speaks; Monad-specific payloads ride on their own keys
//! (`monad_waterfall_v2`, `monad_consensus_state`, `tps_history`).

use std::time::{SystemTime, UNIX_EPOCH};

use monpulse_collectors::ValidatorDirectory;
use monpulse_consensus::ConsensusStateSummary;
use monpulse_waterfall::{LegacyWaterfall, WaterfallGraph};
use serde::Serialize;
use serde_json::json;

use crate::fused::VERSION;

/// Topic carrying the periodic summary stream.
pub const TOPIC_SUMMARY: &str = "summary";
/// Topic carrying peer/validator updates.
pub const TOPIC_PEERS: &str = "peers";
/// Topic carrying epoch descriptors.
pub const TOPIC_EPOCH: &str = "epoch";
/// Topic carrying unsolicited transaction-log events.
pub const TOPIC_TX_FLOW: &str = "tx_flow";

/// Fixed identity key advertised in the handshake.
const IDENTITY_KEY: &str = "MonadValidator1111111111111111111111111";

/// RPC entries appended to the peers update.
const RPC_NODE_COUNT: u64 = 5;

/// One wire frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Message topic.
    pub topic: &'static str,
    /// Message key within the topic.
    pub key: &'static str,
    /// Payload; omitted for bare pings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Sequence id; only pings carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Envelope {
    /// A summary-topic frame with a value.
    pub fn summary(key: &'static str, value: serde_json::Value) -> Self {
        Self {
            topic: TOPIC_SUMMARY,
            key,
            value: Some(value),
            id: None,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The metadata batch sent first on every new connection.
pub fn initial_summary_messages(startup_time_nanos: u64) -> Vec<Envelope> {
    vec![
        Envelope::summary("version", json!(VERSION)),
        Envelope::summary("cluster", json!("development")),
        Envelope::summary("identity_key", json!(IDENTITY_KEY)),
        Envelope::summary("startup_time_nanos", json!(startup_time_nanos)),
        Envelope::summary(
            "startup_progress",
            json!({
                "phase": "running",
                "downloading_full_snapshot_slot": null,
                "downloading_full_snapshot_peer": null,
                "downloading_full_snapshot_elapsed_secs": null,
                "downloading_full_snapshot_remaining_secs": null,
                "downloading_full_snapshot_throughput": null,
                "downloading_full_snapshot_total_bytes": null,
                "downloading_full_snapshot_current_bytes": null,
                "downloading_incremental_snapshot_slot": null,
                "downloading_incremental_snapshot_peer": null,
                "downloading_incremental_snapshot_elapsed_secs": null,
                "downloading_incremental_snapshot_remaining_secs": null,
                "downloading_incremental_snapshot_throughput": null,
                "downloading_incremental_snapshot_total_bytes": null,
                "downloading_incremental_snapshot_current_bytes": null,
                "ledger_slot": null,
                "ledger_max_slot": null,
                "waiting_for_supermajority_slot": null,
                "waiting_for_supermajority_stake_percent": null,
            }),
        ),
        Envelope::summary("vote_state", json!("non-voting")),
    ]
}

fn validator_entry(
    identity: String,
    name: String,
    stake: i64,
    delinquent: bool,
    vote_account: Option<String>,
) -> serde_json::Value {
    let vote = match vote_account {
        Some(account) => json!([{
            "vote_account": account,
            "activated_stake": stake,
            "last_vote": null,
            "root_slot": null,
            "epoch_credits": 0,
            "commission": 0,
            "delinquent": delinquent,
        }]),
        None => json!([]),
    };
    json!({
        "identity_pubkey": identity,
        "gossip": {
            "wallclock": unix_now(),
            "shred_version": 1,
            "version": "1.0.0",
            "feature_set": null,
            "sockets": {},
        },
        "vote": vote,
        "info": {
            "name": name,
            "details": null,
            "website": null,
            "icon_url": null,
        },
    })
}

/// The peers update that lets the client leave its startup screen: active
/// and delinquent validators from the directory plus a few stake-less RPC
/// entries.
pub fn peers_message(node_name: &str, directory: &ValidatorDirectory) -> Envelope {
    let stake_per_validator = if directory.total_validators > 0 {
        (directory.total_stake / directory.total_validators as f64) as i64
    } else {
        0
    };

    let mut validators = Vec::new();
    for i in 0..directory.active_validators {
        validators.push(validator_entry(
            format!("MonadValidator{}", i + 1),
            format!("{}-{}", node_name, i + 1),
            stake_per_validator,
            false,
            Some(format!("MonadVote{}", i + 1)),
        ));
    }
    for i in 0..directory.offline_validators {
        validators.push(validator_entry(
            format!("MonadValidatorOffline{}", i + 1),
            format!("{}-offline-{}", node_name, i + 1),
            stake_per_validator,
            true,
            Some(format!("MonadVoteOffline{}", i + 1)),
        ));
    }
    for i in 0..RPC_NODE_COUNT {
        validators.push(validator_entry(
            format!("MonadRPC{}", i + 1),
            format!("RPC-{}", i + 1),
            0,
            false,
            None,
        ));
    }

    Envelope {
        topic: TOPIC_PEERS,
        key: "update",
        value: Some(json!({ "add": validators })),
        id: None,
    }
}

/// The epoch descriptor, from the epoch index and the fixed epoch length.
pub fn epoch_message(epoch: u64, blocks_per_epoch: u64) -> Envelope {
    let start_slot = epoch * blocks_per_epoch;
    let end_slot = (epoch + 1) * blocks_per_epoch;
    Envelope {
        topic: TOPIC_EPOCH,
        key: "new",
        value: Some(json!({
            "epoch": epoch,
            "start_time_nanos": null,
            "end_time_nanos": null,
            "start_slot": start_slot,
            "end_slot": end_slot,
            "excluded_stake_lamports": 0,
            "staked_pubkeys": [],
            "staked_lamports": [],
            "leader_slots": [],
        })),
        id: None,
    }
}

/// A bare ping with its sequence id.
pub fn ping_message(id: u64) -> Envelope {
    Envelope {
        topic: TOPIC_SUMMARY,
        key: "ping",
        value: None,
        id: Some(id),
    }
}

/// The three slot keys all carrying the current height.
pub fn slot_messages(height: u64) -> [Envelope; 3] {
    [
        Envelope::summary("estimated_slot", json!(height)),
        Envelope::summary("root_slot", json!(height)),
        Envelope::summary("completed_slot", json!(height)),
    ]
}

/// The TPS summary sent on the 1 s cadence.
pub fn estimated_tps_message(
    one_second_tps: f64,
    average_tps: f64,
    instant_tps: f64,
    tx_count: u64,
) -> Envelope {
    Envelope::summary(
        "estimated_tps",
        json!({
            "total": one_second_tps,
            "vote": 0,
            "nonvote_success": average_tps,
            "nonvote_failed": instant_tps,
            "tx_count": tx_count,
        }),
    )
}

/// The graph-shaped waterfall.
pub fn waterfall_v2_message(graph: &WaterfallGraph) -> Envelope {
    Envelope::summary(
        "monad_waterfall_v2",
        serde_json::to_value(graph).unwrap_or(serde_json::Value::Null),
    )
}

/// The legacy waterfall with the fixed Firedancer key mapping.
///
/// The balance-failed → `resolv_lut_failed` and fee-too-low →
/// `resolv_expired` placements are cosmetic artifacts of the original
/// frontend and carry no semantics.
pub fn legacy_waterfall_message(legacy: &LegacyWaterfall) -> Envelope {
    Envelope::summary(
        "live_txn_waterfall",
        json!({
            "next_leader_slot": null,
            "waterfall": {
                "in": {
                    "quic": legacy.ingress.rpc,
                    "udp": legacy.ingress.p2p,
                    "gossip": legacy.ingress.gossip,
                    "pack_cranked": 0,
                    "pack_retained": 0,
                    "resolv_retained": 0,
                    "block_engine": 0,
                },
                "out": {
                    "net_overrun": 0,
                    "quic_overrun": 0,
                    "quic_frag_drop": 0,
                    "quic_abandoned": 0,
                    "tpu_quic_invalid": 0,
                    "tpu_udp_invalid": 0,
                    "verify_overrun": 0,
                    "verify_parse": 0,
                    "verify_failed": legacy.out.verify_failed,
                    "verify_duplicate": legacy.out.nonce_failed,
                    "dedup_duplicate": legacy.out.nonce_failed,
                    "resolv_lut_failed": legacy.out.balance_failed,
                    "resolv_expired": legacy.out.pool_fee_dropped,
                    "resolv_no_ledger": 0,
                    "resolv_ancient": 0,
                    "resolv_retained": 0,
                    "pack_invalid": 0,
                    "pack_invalid_bundle": 0,
                    "pack_retained": 0,
                    "pack_leader_slow": 0,
                    "pack_wait_full": legacy.out.pool_full,
                    "pack_expired": 0,
                    "bank_invalid": legacy.out.exec_failed,
                    "block_success": legacy.out.exec_parallel,
                    "block_fail": legacy.out.exec_sequential,
                },
            },
        }),
    )
}

/// The consensus tracker summary.
pub fn consensus_state_message(summary: &ConsensusStateSummary) -> Envelope {
    Envelope::summary(
        "monad_consensus_state",
        serde_json::to_value(summary).unwrap_or(serde_json::Value::Null),
    )
}

/// Vote distance; this gateway observes a non-voting node.
pub fn vote_distance_message() -> Envelope {
    Envelope::summary("vote_distance", json!(0))
}

/// The chart history buffer.
pub fn tps_history_message(history: &[[f64; 5]]) -> Envelope {
    Envelope::summary(
        "tps_history",
        serde_json::to_value(history).unwrap_or(serde_json::Value::Null),
    )
}

/// An unsolicited transaction-log event on its own topic.
pub fn transaction_log_message(log: &monpulse_types::TransactionLog) -> Envelope {
    Envelope {
        topic: TOPIC_TX_FLOW,
        key: "transaction_log",
        value: Some(serde_json::to_value(log).unwrap_or(serde_json::Value::Null)),
        id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_omits_value_and_carries_id() {
        let json = serde_json::to_string(&ping_message(7)).unwrap();
        assert_eq!(json, r#"{"topic":"summary","key":"ping","id":7}"#);
    }

    #[test]
    fn test_handshake_batch_is_deterministic() {
        // Byte-identical across repeats for a fixed startup time.
        let first = serde_json::to_string(&initial_summary_messages(123)).unwrap();
        let second = serde_json::to_string(&initial_summary_messages(123)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_handshake_batch_order() {
        let keys: Vec<&str> = initial_summary_messages(1)
            .iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "version",
                "cluster",
                "identity_key",
                "startup_time_nanos",
                "startup_progress",
                "vote_state",
            ]
        );
    }

    #[test]
    fn test_peers_message_counts_entries() {
        let directory = ValidatorDirectory::default();
        let peers = peers_message("node", &directory);
        let value = peers.value.expect("peers carries a value");
        let added = value["add"].as_array().expect("add is an array");
        assert_eq!(
            added.len() as u64,
            directory.active_validators + directory.offline_validators + RPC_NODE_COUNT
        );
        // RPC entries have no vote accounts.
        assert!(added.last().unwrap()["vote"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_epoch_message_boundaries() {
        let epoch = epoch_message(3, 50_000);
        let value = epoch.value.expect("epoch carries a value");
        assert_eq!(value["start_slot"], 150_000);
        assert_eq!(value["end_slot"], 200_000);
    }

    #[test]
    fn test_estimated_tps_field_placement() {
        let envelope = estimated_tps_message(100.0, 90.0, 110.0, 44);
        let value = envelope.value.expect("tps carries a value");
        assert_eq!(value["total"], 100.0);
        assert_eq!(value["vote"], 0);
        assert_eq!(value["nonvote_success"], 90.0);
        assert_eq!(value["nonvote_failed"], 110.0);
        assert_eq!(value["tx_count"], 44);
    }
}
