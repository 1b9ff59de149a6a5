//! Handler-level tests against a gateway with no live upstreams.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;

use monpulse_collectors::{
    BlockSubscriber, GatewayConfig, NodeRpcClient, ValidatorDirectoryClient,
};
use monpulse_consensus::ConsensusTracker;
use monpulse_gateway::fused::FusedStore;
use monpulse_gateway::{http, AppState, RegistryHandle};

fn offline_config() -> GatewayConfig {
    GatewayConfig {
        prometheus_endpoint: "http://127.0.0.1:8889/metrics".to_string(),
        ipc_path: "/tmp/unused.sock".into(),
        ws_url: "ws://127.0.0.1:8081".to_string(),
        rpc_url: "http://127.0.0.1:8080".to_string(),
        event_ring_path: "/tmp/unused-events.sock".into(),
        listen_port: 4000,
        network: "testnet".to_string(),
        node_name: "test-node".to_string(),
    }
}

async fn offline_state() -> Arc<AppState> {
    let config = offline_config();
    let rpc = Arc::new(NodeRpcClient::new(&config.rpc_url).expect("rpc client"));
    let subscriber = Arc::new(BlockSubscriber::new(&config.ws_url, Arc::clone(&rpc)));

    Arc::new(AppState {
        config,
        started_at: Instant::now(),
        startup_time_nanos: 1,
        fused: FusedStore::new(),
        prometheus: None,
        ipc: None,
        subscriber,
        tracker: Arc::new(ConsensusTracker::default()),
        event_ring: None,
        validators: Arc::new(ValidatorDirectoryClient::new("testnet")),
        rpc,
        registry: RegistryHandle::spawn(),
    })
}

#[tokio::test]
async fn health_is_always_ok() {
    let response = http::health().await;
    assert_eq!(response.0["status"], "ok");
    assert_eq!(response.0["version"], "0.1.0");
    assert!(response.0["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn fused_metrics_serves_the_default_snapshot_when_cold() {
    let state = offline_state().await;
    let response = http::fused_metrics(State(state)).await;
    assert_eq!(response.0.node_info.status, "starting");
    assert_eq!(response.0.consensus.current_height, 0);
}

#[tokio::test]
async fn waterfall_v2_reports_mock_source_with_no_upstreams() {
    let state = offline_state().await;
    let response = http::waterfall_v2(State(state)).await;
    let json = serde_json::to_value(&response.0).expect("graph serializes");
    assert_eq!(json["metadata"]["source"], "mock_data");
    assert_eq!(json["nodes"].as_array().unwrap().len(), 11);
}

#[tokio::test]
async fn waterfall_v2_uses_tracker_state() {
    let state = offline_state().await;
    state.tracker.on_block_proposed(100, "0x64", 10);
    state.tracker.on_block_proposed(101, "0x65", 12);
    state.tracker.on_block_proposed(102, "0x66", 11);

    let response = http::waterfall_v2(State(state)).await;
    let consensus = &response.0.metadata.consensus_state;
    assert_eq!(consensus.current_block, 102);
    assert_eq!(consensus.finalized_block, 100);
    assert_eq!(consensus.blocks_behind, 2);
}

#[tokio::test]
async fn consensus_endpoint_returns_the_summary() {
    let state = offline_state().await;
    state.tracker.on_block_proposed(7, "0x7", 3);
    let response = http::consensus_state(State(state)).await;
    assert_eq!(response.0.current_block, 7);
    assert_eq!(response.0.proposed_blocks, 1);
}

#[tokio::test]
async fn event_rings_reports_disconnected_with_subscriber_counters() {
    let state = offline_state().await;
    let response = http::event_rings(State(state)).await;
    assert_eq!(response.0["connected"], false);
    assert_eq!(response.0["subscriber"]["dropped_blocks"], 0);
    assert_eq!(response.0["subscriber"]["unrouted_frames"], 0);
}

#[tokio::test]
async fn waterfall_stages_shape_has_eight_stages() {
    let state = offline_state().await;
    let response = http::waterfall_stages(State(state)).await;
    assert_eq!(response.0["stages"].as_array().unwrap().len(), 8);
    assert!(response.0["summary"].get("total_in").is_some());
}
