//! Per-client broadcast loop.
//!
//! Each connected client gets one task: handshake first, then a 200 ms
//! ticker mixing wall-clock-driven sends with new-block-driven sends.
//! Writes are synchronous on the client's own socket, so a slow client
//! blocks nobody else; the first failed write ends the task and the client
//! is deregistered.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use monpulse_collectors::BLOCKS_PER_EPOCH;
use monpulse_waterfall::{generate, generate_legacy};

use crate::protocol::{self, Envelope};
use crate::state::AppState;

/// Broadcast tick period; half the nominal block time so no block is
/// skipped between ticks.
pub const TICK_PERIOD: Duration = Duration::from_millis(200);

/// Minimum spacing between `estimated_tps` sends.
pub const TPS_UPDATE_PERIOD: Duration = Duration::from_secs(1);

/// What a single tick should emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDecision {
    /// The observed height differs from the previous tick's.
    pub is_new_block: bool,
    /// At least [`TPS_UPDATE_PERIOD`] has passed since the last TPS send
    /// (or none was ever sent).
    pub should_update_tps: bool,
}

/// Pure tick-keying rule: history appends follow block arrival, TPS follows
/// the wall clock.
pub fn evaluate_tick(
    height: u64,
    last_height: u64,
    last_tps_sent: Option<Instant>,
    now: Instant,
) -> TickDecision {
    TickDecision {
        is_new_block: height != last_height,
        should_update_tps: last_tps_sent
            .map(|at| now.duration_since(at) >= TPS_UPDATE_PERIOD)
            .unwrap_or(true),
    }
}

async fn send_envelope(
    sink: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).map_err(axum::Error::new)?;
    sink.send(Message::Text(text)).await?;
    monpulse_metrics::gateway::MESSAGES_SENT.inc();
    Ok(())
}

/// Drive one client connection to completion.
pub async fn run_client(socket: WebSocket, state: Arc<AppState>) {
    let (client_id, mut fanout_rx) = state.registry.register().await;
    let (mut sink, mut stream) = socket.split();

    if let Err(err) = send_handshake(&mut sink, &state).await {
        warn!(client = client_id, error = %err, "handshake failed");
        state.registry.deregister(client_id).await;
        return;
    }

    let mut ticker = tokio::time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ping_id: u64 = 0;
    let mut last_height: u64 = 0;
    let mut last_tps_sent: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ping_id += 1;
                match broadcast_tick(
                    &mut sink,
                    &state,
                    ping_id,
                    &mut last_height,
                    &mut last_tps_sent,
                )
                .await
                {
                    Ok(()) => {}
                    Err(err) => {
                        monpulse_metrics::gateway::BROADCAST_ERRORS.inc();
                        debug!(client = client_id, error = %err, "write failed, closing client");
                        break;
                    }
                }
            }
            forwarded = fanout_rx.recv() => {
                match forwarded {
                    Some(envelope) => {
                        if let Err(err) = send_envelope(&mut sink, &envelope).await {
                            monpulse_metrics::gateway::BROADCAST_ERRORS.inc();
                            debug!(client = client_id, error = %err, "fan-out write failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        // Subscription notifications are accepted but all
                        // outputs are pre-committed, so nothing changes.
                        debug!(client = client_id, message = %text, "client message received");
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.registry.deregister(client_id).await;
    info!(client = client_id, "websocket client disconnected");
}

/// Handshake order: summary metadata batch, then peers (so the client can
/// leave the startup screen), then the epoch descriptor.
async fn send_handshake(
    sink: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
) -> Result<(), axum::Error> {
    for envelope in protocol::initial_summary_messages(state.startup_time_nanos) {
        send_envelope(sink, &envelope).await?;
    }

    let directory = state.validators.directory();
    send_envelope(
        sink,
        &protocol::peers_message(&state.config.node_name, &directory),
    )
    .await?;

    let epoch = match state.rpc.current_epoch().await {
        Ok(epoch) => epoch,
        Err(err) => {
            debug!(error = %err, "epoch lookup failed, defaulting to 0");
            0
        }
    };
    send_envelope(sink, &protocol::epoch_message(epoch, BLOCKS_PER_EPOCH)).await?;

    Ok(())
}

async fn broadcast_tick(
    sink: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    ping_id: u64,
    last_height: &mut u64,
    last_tps_sent: &mut Option<Instant>,
) -> Result<(), axum::Error> {
    // Fetch fresh consensus metrics so no block is missed between ticks.
    let consensus = match state.rpc.consensus_stats().await {
        Ok(consensus) => consensus,
        Err(err) => {
            debug!(error = %err, "consensus fetch failed, skipping tick");
            return Ok(());
        }
    };
    let height = consensus.current_height;
    let decision = evaluate_tick(height, *last_height, *last_tps_sent, Instant::now());

    send_envelope(sink, &protocol::ping_message(ping_id)).await?;
    for envelope in protocol::slot_messages(height) {
        send_envelope(sink, &envelope).await?;
    }

    let fused = state.fused.snapshot();
    let (one_second_tps, average_tps, instant_tps, tx_count) = if state.subscriber.is_connected() {
        (
            state.subscriber.one_second_tps(),
            state.subscriber.average_tps(),
            state.subscriber.instant_tps(),
            state.subscriber.latest_block().map(|b| b.tx_count).unwrap_or(0),
        )
    } else {
        let tps = fused.execution.tps;
        (tps, tps, tps, 0)
    };

    // History grows only on block arrival, never on wall-clock ticks.
    if decision.is_new_block {
        state
            .subscriber
            .push_tps_history(one_second_tps, average_tps, instant_tps, tx_count);
        *last_height = height;
    }

    if decision.should_update_tps {
        send_envelope(
            sink,
            &protocol::estimated_tps_message(one_second_tps, average_tps, instant_tps, tx_count),
        )
        .await?;
        *last_tps_sent = Some(Instant::now());
    }

    let inputs = state.waterfall_inputs();
    let graph = generate(&inputs);
    debug!(source = ?graph.metadata.source, "waterfall generated");
    send_envelope(sink, &protocol::waterfall_v2_message(&graph)).await?;
    send_envelope(
        sink,
        &protocol::legacy_waterfall_message(&generate_legacy(&inputs)),
    )
    .await?;

    send_envelope(
        sink,
        &protocol::consensus_state_message(&state.tracker.consensus_state()),
    )
    .await?;
    send_envelope(sink, &protocol::vote_distance_message()).await?;

    if decision.is_new_block {
        send_envelope(
            sink,
            &protocol::tps_history_message(&state.subscriber.tps_history()),
        )
        .await?;
        info!(
            height,
            one_second_tps, average_tps, instant_tps, tx_count, "new block broadcast"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_sends_tps_and_history() {
        let now = Instant::now();
        let decision = evaluate_tick(100, 0, None, now);
        assert!(decision.is_new_block);
        assert!(decision.should_update_tps);
    }

    #[test]
    fn test_same_height_skips_history() {
        let now = Instant::now();
        let decision = evaluate_tick(100, 100, Some(now), now);
        assert!(!decision.is_new_block);
        assert!(!decision.should_update_tps);
    }

    #[test]
    fn test_tps_cadence_is_one_second() {
        let start = Instant::now();
        let almost = start + Duration::from_millis(800);
        let past = start + Duration::from_millis(1000);

        assert!(!evaluate_tick(1, 1, Some(start), almost).should_update_tps);
        assert!(evaluate_tick(1, 1, Some(start), past).should_update_tps);
    }

    #[test]
    fn test_broadcast_cadence_scenario() {
        // Ticks at 0, 0.2, 0.4, 0.6, 0.8 s; height changes at 0, 0.4, 0.8 s.
        let start = Instant::now();
        let heights = [100u64, 100, 101, 101, 102];
        let mut last_height = 0u64;
        let mut last_tps_sent: Option<Instant> = None;
        let mut history_appends = Vec::new();
        let mut tps_sends = Vec::new();

        for (i, height) in heights.iter().enumerate() {
            let now = start + Duration::from_millis(200 * i as u64);
            let decision = evaluate_tick(*height, last_height, last_tps_sent, now);
            if decision.is_new_block {
                history_appends.push(i);
                last_height = *height;
            }
            if decision.should_update_tps {
                tps_sends.push(i);
                last_tps_sent = Some(now);
            }
        }

        // Appends exactly where the height changed: t = 0, 0.4, 0.8 s.
        assert_eq!(history_appends, vec![0, 2, 4]);
        // TPS at t = 0 and not again within the first second.
        assert_eq!(tps_sends, vec![0]);
    }
}
