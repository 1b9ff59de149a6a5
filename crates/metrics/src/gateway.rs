//! Downstream gateway metrics.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Registry};

pub static WS_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "monpulse_ws_clients_connected",
        "Currently connected WebSocket clients",
    )
    .expect("metric can be created")
});

pub static BROADCAST_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_ws_broadcast_errors_total",
        "Failed writes to WebSocket clients",
    )
    .expect("metric can be created")
});

pub static MESSAGES_SENT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_ws_messages_sent_total",
        "Wire-protocol messages written to clients",
    )
    .expect("metric can be created")
});

pub static LOG_FANOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_tx_log_fanouts_total",
        "Transaction-log events fanned out to the client registry",
    )
    .expect("metric can be created")
});

/// Register gateway metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WS_CLIENTS.clone()))
        .expect("gateway metrics can be registered");
    registry
        .register(Box::new(BROADCAST_ERRORS.clone()))
        .expect("gateway metrics can be registered");
    registry
        .register(Box::new(MESSAGES_SENT.clone()))
        .expect("gateway metrics can be registered");
    registry
        .register(Box::new(LOG_FANOUTS.clone()))
        .expect("gateway metrics can be registered");
}
