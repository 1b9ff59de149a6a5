//! Upstream collector metrics.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Registry};

pub static SCRAPE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_prometheus_scrape_failures_total",
        "Failed scrapes of the upstream Prometheus endpoint",
    )
    .expect("metric can be created")
});

pub static IPC_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_ipc_poll_failures_total",
        "Failed polls of the upstream IPC socket",
    )
    .expect("metric can be created")
});

pub static BLOCKS_OBSERVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_blocks_observed_total",
        "Enriched block headers observed on the subscription",
    )
    .expect("metric can be created")
});

pub static UNROUTED_FRAMES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_subscription_unrouted_frames_total",
        "Subscription frames with an unknown subscription id",
    )
    .expect("metric can be created")
});

pub static RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_subscription_reconnects_total",
        "Re-dials of the upstream subscription socket",
    )
    .expect("metric can be created")
});

pub static CHANNEL_DROPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        prometheus::opts!(
            "monpulse_channel_drops_total",
            "Events dropped because an internal channel was full"
        ),
        &["channel"], // "blocks", "logs", "errors", "ring"
    )
    .expect("metric can be created")
});

pub static RING_MISSED_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "monpulse_event_ring_missed_total",
        "Execution events skipped by sequence-number gaps",
    )
    .expect("metric can be created")
});

/// Register collector metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SCRAPE_FAILURES.clone()))
        .expect("collector metrics can be registered");
    registry
        .register(Box::new(IPC_FAILURES.clone()))
        .expect("collector metrics can be registered");
    registry
        .register(Box::new(BLOCKS_OBSERVED.clone()))
        .expect("collector metrics can be registered");
    registry
        .register(Box::new(UNROUTED_FRAMES.clone()))
        .expect("collector metrics can be registered");
    registry
        .register(Box::new(RECONNECTS.clone()))
        .expect("collector metrics can be registered");
    registry
        .register(Box::new(CHANNEL_DROPS.clone()))
        .expect("collector metrics can be registered");
    registry
        .register(Box::new(RING_MISSED_EVENTS.clone()))
        .expect("collector metrics can be registered");
}
