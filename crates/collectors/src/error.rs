//! Collector error types.

use thiserror::Error;

/// Errors produced by the upstream collectors.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// HTTP transport failure (scrape or directory fetch).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON-RPC client failure.
    #[error("json-rpc request failed: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    /// Socket-level failure (IPC, event ring).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload failed to serialize or deserialize.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A reply lacked an expected field.
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// An I/O deadline elapsed.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// The subscription handshake did not complete.
    #[error("subscription handshake failed: {0}")]
    Handshake(String),
}
