//! Upstream collectors for the monpulse telemetry gateway.
//!
//! Each collector runs on its own schedule, owns its snapshot behind a lock,
//! and exposes copy-on-read accessors plus a freshness-gated `is_healthy`.
//! Transient upstream failures never corrupt a snapshot: the previous value
//! stays authoritative until a scrape, poll or subscription event replaces
//! it.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event_ring;
pub mod ipc;
pub mod prometheus;
pub mod rpc;
pub mod subscriber;
pub mod validators;

pub use config::GatewayConfig;
pub use error::CollectorError;
pub use event_ring::{EventRingReader, EventRingStats, ExecutionEvent};
pub use ipc::{IpcCollector, IpcSnapshot};
pub use prometheus::{PrometheusCollector, PrometheusSnapshot};
pub use rpc::{NodeRpcClient, BLOCKS_PER_EPOCH};
pub use subscriber::{BlockSubscriber, SubscriberStats};
pub use validators::{ValidatorDirectory, ValidatorDirectoryClient};
