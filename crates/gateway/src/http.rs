//! REST handlers.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use monpulse_consensus::ConsensusStateSummary;
use monpulse_types::FusedSnapshot;
use monpulse_waterfall::{generate, WaterfallGraph};

use crate::fused::VERSION;
use crate::state::AppState;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `GET /api/v1/health`. Always 200.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": unix_now(),
        "version": VERSION,
    }))
}

/// `GET /api/v1/metrics`: the fused snapshot.
pub async fn fused_metrics(State(state): State<Arc<AppState>>) -> Json<FusedSnapshot> {
    Json(state.fused.snapshot())
}

/// `GET /api/v1/waterfall`: the legacy stages view composed from the fused
/// stage totals.
pub async fn waterfall_stages(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.fused.snapshot();
    let w = &snapshot.waterfall;

    let total_ingress = w.rpc_received + w.gossip_received;
    let after_signature = w.mempool_size.saturating_sub(w.signature_failed);
    let after_nonce = after_signature.saturating_sub(w.nonce_duplicate);
    let executed = w.evm_parallel_executed + w.evm_sequential_fallback;
    let parallel_rate = if executed > 0 {
        w.evm_parallel_executed as f64 / executed as f64 * 100.0
    } else {
        0.0
    };

    Json(json!({
        "timestamp": snapshot.timestamp,
        "stages": [
            {
                "name": "RPC Ingress",
                "in": w.rpc_received,
                "out": 0,
                "drop": 0,
                "success": w.rpc_received,
            },
            {
                "name": "Gossip Ingress",
                "in": w.gossip_received,
                "out": 0,
                "drop": 0,
                "success": w.gossip_received,
            },
            {
                "name": "Mempool",
                "in": total_ingress,
                "out": 0,
                "drop": 0,
                "success": w.mempool_size,
            },
            {
                "name": "Signature Verify",
                "in": w.mempool_size,
                "out": w.signature_failed,
                "drop": w.signature_failed,
                "success": after_signature,
            },
            {
                "name": "Nonce Dedup",
                "in": after_signature,
                "out": w.nonce_duplicate,
                "drop": w.nonce_duplicate,
                "success": after_nonce,
            },
            {
                "name": "EVM Execution",
                "in": executed,
                "out": 0,
                "drop": 0,
                "success": executed,
                "parallel_rate": parallel_rate,
            },
            {
                "name": "BFT Consensus",
                "in": w.bft_proposed,
                "out": 0,
                "drop": 0,
                "success": w.bft_committed,
            },
            {
                "name": "State Persistence",
                "in": w.bft_committed,
                "out": 0,
                "drop": 0,
                "success": w.state_updated,
            },
        ],
        "summary": {
            "total_in": total_ingress,
            "total_success": w.blocks_broadcast,
            "total_dropped": w.signature_failed + w.nonce_duplicate + w.gas_invalid
                + w.balance_insufficient,
            "success_rate": 0.95,
        },
    }))
}

/// `GET /api/v1/waterfall/v2`: the lifecycle graph.
pub async fn waterfall_v2(State(state): State<Arc<AppState>>) -> Json<WaterfallGraph> {
    Json(generate(&state.waterfall_inputs()))
}

/// `GET /api/v1/consensus`: the tracker summary.
pub async fn consensus_state(State(state): State<Arc<AppState>>) -> Json<ConsensusStateSummary> {
    Json(state.tracker.consensus_state())
}

/// `GET /api/v1/event-rings`: ring reader status plus subscriber channel
/// drop counters.
pub async fn event_rings(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut status = match &state.event_ring {
        Some(reader) => {
            serde_json::to_value(reader.stats()).unwrap_or(serde_json::Value::Null)
        }
        None => json!({
            "connected": false,
            "message": "Event rings not initialized",
        }),
    };
    if let Some(map) = status.as_object_mut() {
        map.insert(
            "subscriber".to_string(),
            serde_json::to_value(state.subscriber.stats()).unwrap_or(serde_json::Value::Null),
        );
    }
    Json(status)
}

/// `GET /metrics`: the gateway's own registry in Prometheus text format.
pub async fn self_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        monpulse_metrics::gather_text(),
    )
}
