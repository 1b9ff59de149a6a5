//! Router assembly and the WebSocket upgrade endpoint.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::broadcast::run_client;
use crate::http;
use crate::state::AppState;

/// Build the gateway router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/metrics", get(http::fused_metrics))
        .route("/api/v1/waterfall", get(http::waterfall_stages))
        .route("/api/v1/waterfall/v2", get(http::waterfall_v2))
        .route("/api/v1/consensus", get(http::consensus_state))
        .route("/api/v1/event-rings", get(http::event_rings))
        .route("/websocket", get(websocket_upgrade))
        .route("/metrics", get(http::self_metrics))
        .layer(cors)
        .with_state(state)
}

/// Upgrade `/websocket` connections, advertising the compression
/// subprotocol the frontend negotiates.
async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.protocols(["compress-zstd"])
        .on_upgrade(move |socket| run_client(socket, state))
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "gateway listening");
    axum::serve(listener, router(state)).await
}
