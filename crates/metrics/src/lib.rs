//! monpulse self-instrumentation metrics.
//!
//! This crate provides centralized metric definitions for the gateway
//! process itself (not the observed node). Metrics are organized by
//! subsystem: collectors and gateway.

pub mod collectors;
pub mod gateway;

use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};

/// Global Prometheus registry for all monpulse metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();

    collectors::register_metrics(&registry);
    gateway::register_metrics(&registry);

    registry
});

/// Initialize all metrics. Call once at startup.
pub fn init() {
    Lazy::force(&REGISTRY);
    tracing::info!("monpulse metrics initialized");
}

/// Encode the registry in Prometheus text format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_gathers_after_init() {
        init();
        collectors::BLOCKS_OBSERVED.inc();
        let text = gather_text();
        assert!(text.contains("monpulse_blocks_observed_total"));
    }
}
