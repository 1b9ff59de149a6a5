//! Construction and wiring of the gateway's components.
//!
//! Every upstream is optional: a collector that cannot reach its source at
//! startup is logged and left out, and the waterfall generator falls through
//! to the next source. The gateway always comes up.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use monpulse_collectors::{
    BlockSubscriber, EventRingReader, GatewayConfig, IpcCollector, NodeRpcClient,
    PrometheusCollector, ValidatorDirectoryClient,
};
use monpulse_consensus::ConsensusTracker;
use monpulse_gateway::fused::FusedStore;
use monpulse_gateway::{protocol, server, AppState, RegistryHandle};

/// Fallback polling period when the subscription cannot be established.
const POLL_FALLBACK_PERIOD: Duration = Duration::from_secs(1);

/// Build all components, start the collectors and serve until exit.
pub async fn run(port: u16) -> Result<()> {
    let mut config = GatewayConfig::from_env();
    config.listen_port = port;

    monpulse_metrics::init();

    let tracker = Arc::new(ConsensusTracker::default());
    info!("consensus tracker initialized");

    let registry = RegistryHandle::spawn();
    let rpc = Arc::new(NodeRpcClient::new(&config.rpc_url).context("building node rpc client")?);

    let event_ring = {
        let reader = Arc::new(EventRingReader::new(&config.event_ring_path));
        match Arc::clone(&reader).connect().await {
            Ok(()) => Some(reader),
            Err(err) => {
                warn!(error = %err, "event rings not available, running in RPC-only mode");
                None
            }
        }
    };

    let prometheus = {
        let collector = Arc::new(PrometheusCollector::new(&config.prometheus_endpoint));
        info!(endpoint = %config.prometheus_endpoint, "connecting to prometheus endpoint");
        match Arc::clone(&collector).start().await {
            Ok(()) => {
                info!("prometheus collector initialized");
                Some(collector)
            }
            Err(err) => {
                warn!(error = %err, "prometheus collector not available, TPS will come from block data");
                None
            }
        }
    };

    let ipc = {
        let collector = Arc::new(IpcCollector::new(&config.ipc_path));
        info!(path = %config.ipc_path.display(), "connecting to node ipc");
        match Arc::clone(&collector).start().await {
            Ok(()) => {
                info!("ipc collector initialized");
                Some(collector)
            }
            Err(err) => {
                warn!(error = %err, "ipc collector not available, using estimation-based metrics");
                None
            }
        }
    };

    let validators = Arc::new(ValidatorDirectoryClient::new(config.network.clone()));
    Arc::clone(&validators).start().await;

    let subscriber = Arc::new(BlockSubscriber::new(&config.ws_url, Arc::clone(&rpc)));

    let startup_time_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let state = Arc::new(AppState {
        config,
        started_at: Instant::now(),
        startup_time_nanos,
        fused: FusedStore::new(),
        prometheus,
        ipc,
        subscriber: Arc::clone(&subscriber),
        tracker,
        event_ring,
        validators,
        rpc,
        registry,
    });

    info!(url = %state.config.ws_url, "connecting to upstream websocket");
    match Arc::clone(&subscriber).connect().await {
        Ok(()) => {
            info!("real-time block subscription established");
        }
        Err(err) => {
            warn!(error = %err, "websocket subscription failed, falling back to polling");
            spawn_polling_fallback(Arc::clone(&state));
        }
    }

    spawn_block_processing(Arc::clone(&state));
    spawn_log_fanout(Arc::clone(&state));
    spawn_error_drain(Arc::clone(&state));
    spawn_event_drain(Arc::clone(&state));

    let port = state.config.listen_port;
    info!(port, "monpulse gateway starting");
    server::serve(state, port).await.context("serving gateway")
}

/// Drain enriched blocks: drive the consensus tracker and rebuild the fused
/// snapshot.
fn spawn_block_processing(state: Arc<AppState>) {
    let Some(mut blocks) = state.subscriber.take_block_channel() else {
        return;
    };
    tokio::spawn(async move {
        while let Some(header) = blocks.recv().await {
            state
                .tracker
                .on_block_proposed(header.number, &header.hash, header.tx_count);

            let pending = state
                .ipc
                .as_ref()
                .filter(|c| c.is_healthy())
                .map(|c| c.snapshot().pending_txs)
                .or_else(|| {
                    state
                        .prometheus
                        .as_ref()
                        .filter(|c| c.is_healthy())
                        .map(|c| c.snapshot().pending_txs as u64)
                })
                .unwrap_or(0);

            state.fused.update_from_block(
                &header,
                state.subscriber.average_tps(),
                pending,
                &state.config.node_name,
                state.uptime_secs(),
            );
        }
    });
}

/// Fan each transaction-log event out to every registered client.
fn spawn_log_fanout(state: Arc<AppState>) {
    let Some(mut logs) = state.subscriber.take_logs_channel() else {
        return;
    };
    tokio::spawn(async move {
        while let Some(log) = logs.recv().await {
            monpulse_metrics::gateway::LOG_FANOUTS.inc();
            state
                .registry
                .broadcast(protocol::transaction_log_message(&log))
                .await;
        }
    });
}

/// Log subscriber-side errors; they are recoverable and already triggered a
/// reconnect.
fn spawn_error_drain(state: Arc<AppState>) {
    let Some(mut errors) = state.subscriber.take_error_channel() else {
        return;
    };
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            warn!(error = %err, "subscriber reported an error");
        }
    });
}

/// Drain the execution event ring so its buffer never saturates; events are
/// surfaced through `/api/v1/event-rings` counters.
fn spawn_event_drain(state: Arc<AppState>) {
    let Some(reader) = state.event_ring.as_ref() else {
        return;
    };
    let Some(mut events) = reader.take_event_channel() else {
        return;
    };
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(
                sequence = event.header.sequence,
                event_type = event.header.event_type,
                "execution event"
            );
        }
    });
}

/// Without a subscription, refresh the fused snapshot by polling the node's
/// RPC once per second.
fn spawn_polling_fallback(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_FALLBACK_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.rpc.latest_block().await {
                Ok(Some(header)) => {
                    state
                        .tracker
                        .on_block_proposed(header.number, &header.hash, header.tx_count);
                    let pending = state.rpc.pending_tx_count().await;
                    state.fused.update_from_block(
                        &header,
                        0.0,
                        pending,
                        &state.config.node_name,
                        state.uptime_secs(),
                    );
                }
                Ok(None) => debug!("node reports no latest block yet"),
                Err(err) => debug!(error = %err, "polling fallback fetch failed"),
            }
        }
    });
}
