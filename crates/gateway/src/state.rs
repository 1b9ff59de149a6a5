//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use monpulse_collectors::{
    BlockSubscriber, EventRingReader, GatewayConfig, IpcCollector, NodeRpcClient,
    PrometheusCollector, ValidatorDirectoryClient,
};
use monpulse_consensus::ConsensusTracker;
use monpulse_waterfall::WaterfallInputs;

use crate::fused::FusedStore;
use crate::registry::RegistryHandle;

/// Everything the HTTP handlers and broadcast loops need, wired once at
/// startup. Collectors that failed to start are absent rather than
/// half-initialized.
pub struct AppState {
    /// Runtime configuration.
    pub config: GatewayConfig,
    /// Process start time, for uptime reporting.
    pub started_at: Instant,
    /// Process start time in unix nanoseconds, for the handshake.
    pub startup_time_nanos: u64,
    /// The fused snapshot store.
    pub fused: FusedStore,
    /// Prometheus collector, when its first scrape succeeded.
    pub prometheus: Option<Arc<PrometheusCollector>>,
    /// IPC collector, when its first poll succeeded.
    pub ipc: Option<Arc<IpcCollector>>,
    /// Block/log subscription client. Always constructed; `is_connected`
    /// gates its use.
    pub subscriber: Arc<BlockSubscriber>,
    /// Consensus phase tracker.
    pub tracker: Arc<ConsensusTracker>,
    /// Execution event-ring reader, when its socket was reachable.
    pub event_ring: Option<Arc<EventRingReader>>,
    /// Validator directory client.
    pub validators: Arc<ValidatorDirectoryClient>,
    /// Upstream JSON-RPC client.
    pub rpc: Arc<NodeRpcClient>,
    /// Client registry actor handle.
    pub registry: RegistryHandle,
}

impl AppState {
    /// Seconds since the gateway started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Assemble waterfall inputs from whichever collectors are live right
    /// now. Health gating happens here so the generator stays pure.
    pub fn waterfall_inputs(&self) -> WaterfallInputs {
        WaterfallInputs {
            prometheus: self
                .prometheus
                .as_ref()
                .filter(|c| c.is_healthy())
                .map(|c| c.snapshot()),
            ipc: self
                .ipc
                .as_ref()
                .filter(|c| c.is_healthy())
                .map(|c| c.snapshot()),
            latest_block: if self.subscriber.is_connected() {
                self.subscriber.latest_block()
            } else {
                None
            },
            consensus: self.tracker.consensus_state(),
        }
    }
}
