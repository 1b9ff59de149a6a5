//! Waterfall generation tests: source priority, stage arithmetic and flow
//! conservation.

use std::collections::HashMap;

use monpulse_collectors::{IpcSnapshot, PrometheusSnapshot};
use monpulse_consensus::ConsensusStateSummary;
use monpulse_types::BlockHeader;
use monpulse_waterfall::{generate, generate_legacy, WaterfallGraph, WaterfallInputs, WaterfallSource};

fn active_prometheus() -> PrometheusSnapshot {
    PrometheusSnapshot {
        tx_commits_total: 150.0,
        insert_owned_txs: 20.0,
        tps: 10.0,
        insert_owned_rate: 2.0,
        ..Default::default()
    }
}

fn test_block(tx_count: u64) -> BlockHeader {
    BlockHeader {
        number: 1234,
        hash: "0xfeedface".to_string(),
        timestamp: 1_700_000_000,
        tx_count,
        gas_used: 21_000,
    }
}

/// For each interior node, flow in must equal flow out (drops route to the
/// explicit sink, so they are part of the outflow).
fn assert_flow_conservation(graph: &WaterfallGraph) {
    let mut inflow: HashMap<&str, i64> = HashMap::new();
    let mut outflow: HashMap<&str, i64> = HashMap::new();
    for link in &graph.links {
        *inflow.entry(link.target).or_default() += link.value;
        *outflow.entry(link.source).or_default() += link.value;
    }

    for node in [
        "mempool",
        "block_building",
        "consensus_proposed",
        "consensus_voted",
        "consensus_finalized",
        "execution",
        "state_update",
    ] {
        let input = inflow.get(node).copied().unwrap_or(0);
        let output = outflow.get(node).copied().unwrap_or(0);
        assert_eq!(input, output, "flow imbalance at {node}: {input} in, {output} out");
    }
}

fn link_value(graph: &WaterfallGraph, source: &str, target: &str) -> Option<i64> {
    graph
        .links
        .iter()
        .find(|l| l.source == source && l.target == target)
        .map(|l| l.value)
}

#[test]
fn cold_start_with_live_prometheus() {
    let inputs = WaterfallInputs {
        prometheus: Some(active_prometheus()),
        ..Default::default()
    };
    let graph = generate(&inputs);

    assert_eq!(graph.metadata.source, WaterfallSource::PrometheusMetrics);
    assert_eq!(graph.metadata.tps, Some(10.0));

    // A single flow: 2/s owned inserts over the 5 s interval, no drops.
    assert_eq!(link_value(&graph, "submission_rpc", "mempool"), Some(10));
    assert_eq!(link_value(&graph, "submission_p2p", "mempool"), None);
    assert_eq!(link_value(&graph, "mempool", "block_building"), Some(10));
    assert_eq!(link_value(&graph, "block_building", "consensus_proposed"), Some(10));
    assert_eq!(link_value(&graph, "consensus_proposed", "consensus_voted"), Some(10));
    assert_eq!(link_value(&graph, "consensus_voted", "consensus_finalized"), Some(10));
    assert_eq!(link_value(&graph, "consensus_finalized", "execution"), Some(10));
    assert_eq!(link_value(&graph, "execution", "state_update"), Some(10));
    assert_eq!(link_value(&graph, "state_update", "finality"), Some(10));
    assert_eq!(link_value(&graph, "mempool", "dropped"), None);

    assert!(graph.links.iter().all(|l| l.value > 0));
    assert_flow_conservation(&graph);
}

#[test]
fn inactive_prometheus_falls_through_to_block_estimation() {
    // Prometheus is healthy but shows no activity; the subscriber has a
    // block with 200 transactions.
    let inputs = WaterfallInputs {
        prometheus: Some(PrometheusSnapshot::default()),
        latest_block: Some(test_block(200)),
        ..Default::default()
    };
    let graph = generate(&inputs);

    assert_eq!(graph.metadata.source, WaterfallSource::BlockEstimation);
    assert_eq!(graph.metadata.block_height, Some(1234));
    assert_eq!(link_value(&graph, "submission_rpc", "mempool"), Some(100));
    assert_eq!(link_value(&graph, "submission_p2p", "mempool"), Some(100));

    // Fixed ratios: 1% signature, 0.5% nonce, 0.2% balance over 200 txs.
    let drops = graph.drops.expect("block estimation accounts drops");
    assert_eq!(drops.invalid_signature, 2);
    assert_eq!(drops.nonce_invalid, 1);
    assert_eq!(drops.insufficient_balance, 0);
    assert_eq!(link_value(&graph, "mempool", "dropped"), Some(3));
    assert_eq!(link_value(&graph, "mempool", "block_building"), Some(197));

    assert!(graph.links.iter().all(|l| l.value > 0));
    assert_flow_conservation(&graph);
}

#[test]
fn prometheus_with_commits_but_dead_txpool_counters_is_skipped() {
    let prometheus = PrometheusSnapshot {
        tps: 25.0, // commits moving, but both insert rates are zero
        ..Default::default()
    };
    let inputs = WaterfallInputs {
        prometheus: Some(prometheus),
        latest_block: Some(test_block(40)),
        ..Default::default()
    };
    assert_eq!(generate(&inputs).metadata.source, WaterfallSource::BlockEstimation);
}

#[test]
fn ipc_outranks_block_estimation() {
    let ipc = IpcSnapshot {
        insert_owned_txs: 60,
        insert_forwarded_txs: 40,
        drop_invalid_signature: 5,
        drop_nonce_too_low: 3,
        drop_insufficient_balance: 2,
        drop_pool_full: 1,
        drop_fee_too_low: 4,
        pending_txs: 11,
        tracked_txs: 22,
        ..Default::default()
    };
    let inputs = WaterfallInputs {
        ipc: Some(ipc),
        latest_block: Some(test_block(500)),
        ..Default::default()
    };
    let graph = generate(&inputs);

    assert_eq!(graph.metadata.source, WaterfallSource::RealIpcMetrics);
    assert_eq!(graph.metadata.pending_txs, Some(11));

    // 100 in, 5 dropped at mempool-signature, 3 at nonce, 10 at building.
    assert_eq!(link_value(&graph, "mempool", "dropped"), Some(8));
    assert_eq!(link_value(&graph, "mempool", "block_building"), Some(92));
    assert_eq!(link_value(&graph, "block_building", "dropped"), Some(7));
    assert_eq!(link_value(&graph, "block_building", "consensus_proposed"), Some(85));

    let drops = graph.drops.expect("ipc path accounts drops");
    assert_eq!(drops.total(), 15);
    assert_flow_conservation(&graph);
}

#[test]
fn mock_is_the_last_resort() {
    let graph = generate(&WaterfallInputs::default());
    assert_eq!(graph.metadata.source, WaterfallSource::MockData);
    assert!(graph.drops.is_none());
    assert!(graph.links.iter().all(|l| l.value > 0));
    // The mock routes execution drops explicitly, so conservation holds.
    assert_flow_conservation(&graph);
}

#[test]
fn graph_has_the_eleven_canonical_nodes() {
    let graph = generate(&WaterfallInputs::default());
    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id).collect();
    assert_eq!(
        ids,
        vec![
            "submission_rpc",
            "submission_p2p",
            "mempool",
            "block_building",
            "consensus_proposed",
            "consensus_voted",
            "consensus_finalized",
            "execution",
            "state_update",
            "finality",
            "dropped",
        ]
    );
}

#[test]
fn metadata_embeds_consensus_summary() {
    let consensus = ConsensusStateSummary {
        current_block: 102,
        finalized_block: 100,
        blocks_behind: 2,
        ..Default::default()
    };
    let inputs = WaterfallInputs {
        consensus,
        ..Default::default()
    };
    let graph = generate(&inputs);
    assert_eq!(graph.metadata.consensus_state.current_block, 102);
    assert_eq!(graph.metadata.consensus_state.blocks_behind, 2);
}

#[test]
fn legacy_shape_follows_the_same_priority() {
    let inputs = WaterfallInputs {
        prometheus: Some(active_prometheus()),
        ..Default::default()
    };
    let legacy = generate_legacy(&inputs);
    assert_eq!(legacy.metadata.source, WaterfallSource::PrometheusMetrics);
    assert_eq!(legacy.ingress.rpc, 10);
    assert_eq!(legacy.ingress.p2p, 0);
    // 10 tx/s over 5 s: 50 successful, split 85/15.
    assert_eq!(legacy.out.exec_parallel, 42);
    assert_eq!(legacy.out.exec_sequential, 7);
    assert_eq!(legacy.out.block_proposed, 12);
}

#[test]
fn legacy_serializes_with_in_out_keys() {
    let legacy = generate_legacy(&WaterfallInputs::default());
    let json = serde_json::to_value(&legacy).expect("legacy serializes");
    assert!(json.get("in").is_some());
    assert!(json.get("out").is_some());
    assert_eq!(json["metadata"]["source"], "mock_data");
}
