//! Real-time block and transaction-log subscription client.
//!
//! Maintains a JSON-RPC WebSocket connection to the upstream node with two
//! subscriptions: `newHeads` for block headers and `monadLogs` for
//! per-transaction log events. Because `newHeads` carries no transaction
//! count, every header is enriched with an `eth_getBlockByNumber` call
//! before it is published on the block channel.
//!
//! All channel sends are non-blocking; a full channel drops the event and
//! counts the drop. Read errors trigger a re-dial after a short delay, and
//! the re-run handshake adopts fresh subscription ids.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use monpulse_types::hex::{opt_u64_quantity, u64_quantity};
use monpulse_types::{BlockHeader, BlockTxInfo, TransactionLog};

use crate::error::CollectorError;
use crate::rpc::{NodeRpcClient, BLOCKS_PER_EPOCH, BLOCK_TIME_SECS};

/// Size of the recent-blocks window used for TPS calculation (~4 s of data).
pub const MAX_RECENT_BLOCKS: usize = 10;

/// Chart history length (~80 s of data at one point per block).
pub const MAX_TPS_HISTORY: usize = 200;

/// Block channel capacity.
const BLOCK_CHANNEL_CAPACITY: usize = 100;

/// Transaction-log channel capacity.
const LOGS_CHANNEL_CAPACITY: usize = 1000;

/// Error channel capacity.
const ERROR_CHANNEL_CAPACITY: usize = 10;

/// Delay before re-dialing after a read error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Drop and routing counters, snapshot for `/api/v1/event-rings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    /// Enriched headers dropped because the block channel was full.
    pub dropped_blocks: u64,
    /// Log events dropped because the logs channel was full.
    pub dropped_logs: u64,
    /// Errors dropped because the error channel was full.
    pub dropped_errors: u64,
    /// Subscription frames with an id matching neither subscription.
    pub unrouted_frames: u64,
    /// Frames or payloads that failed to deserialize.
    pub parse_errors: u64,
}

#[derive(Default)]
struct Counters {
    dropped_blocks: AtomicU64,
    dropped_logs: AtomicU64,
    dropped_errors: AtomicU64,
    unrouted_frames: AtomicU64,
    parse_errors: AtomicU64,
}

#[derive(Default)]
struct SubscriberState {
    connected: bool,
    latest_block: Option<BlockHeader>,
    recent_blocks: VecDeque<BlockTxInfo>,
    tps_history: VecDeque<[f64; 5]>,
}

/// Incoming frame shapes at the WebSocket boundary.
///
/// Only `eth_subscription` events are routed; replies (subscribe confirms
/// outside the handshake, unsubscribe acks) and anything else fall through.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UpstreamFrame {
    Event { method: String, params: EventParams },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct EventParams {
    subscription: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct HandshakeReply {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// A `newHeads` payload.
#[derive(Debug, Deserialize)]
struct HeadPayload {
    #[serde(deserialize_with = "u64_quantity::deserialize")]
    number: u64,
    #[serde(default)]
    hash: String,
    #[serde(deserialize_with = "u64_quantity::deserialize")]
    timestamp: u64,
    #[serde(rename = "gasUsed", default, deserialize_with = "opt_u64_quantity::deserialize")]
    gas_used: Option<u64>,
    #[serde(default)]
    transactions: Option<Vec<serde_json::Value>>,
}

/// Subscription client for the upstream node's WebSocket endpoint.
pub struct BlockSubscriber {
    ws_url: String,
    rpc: Arc<NodeRpcClient>,
    inner: RwLock<SubscriberState>,
    counters: Counters,
    block_tx: mpsc::Sender<BlockHeader>,
    block_rx: Mutex<Option<mpsc::Receiver<BlockHeader>>>,
    logs_tx: mpsc::Sender<TransactionLog>,
    logs_rx: Mutex<Option<mpsc::Receiver<TransactionLog>>>,
    error_tx: mpsc::Sender<CollectorError>,
    error_rx: Mutex<Option<mpsc::Receiver<CollectorError>>>,
    cancel: CancellationToken,
}

impl BlockSubscriber {
    /// Create a subscriber for `ws_url`, enriching via `rpc`. Nothing is
    /// dialed until [`connect`](Self::connect).
    pub fn new(ws_url: impl Into<String>, rpc: Arc<NodeRpcClient>) -> Self {
        let (block_tx, block_rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);
        let (logs_tx, logs_rx) = mpsc::channel(LOGS_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            ws_url: ws_url.into(),
            rpc,
            inner: RwLock::new(SubscriberState::default()),
            counters: Counters::default(),
            block_tx,
            block_rx: Mutex::new(Some(block_rx)),
            logs_tx,
            logs_rx: Mutex::new(Some(logs_rx)),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Dial the upstream, run the two-subscription handshake and spawn the
    /// listener.
    pub async fn connect(self: Arc<Self>) -> Result<(), CollectorError> {
        let (socket, heads_id, logs_id) = handshake(&self.ws_url).await?;
        info!(heads = %heads_id, logs = %logs_id, url = %self.ws_url, "subscribed to upstream streams");
        self.inner.write().connected = true;

        let subscriber = Arc::clone(&self);
        tokio::spawn(async move {
            subscriber.listen(socket, heads_id, logs_id).await;
        });
        Ok(())
    }

    /// Cancel the listener; it sends best-effort unsubscribes and closes the
    /// socket on its way out.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// True while the subscription socket is established.
    pub fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    /// The most recently observed header, enriched once enrichment lands.
    pub fn latest_block(&self) -> Option<BlockHeader> {
        self.inner.read().latest_block.clone()
    }

    /// Take the enriched-block stream. Yields `None` after the first call.
    pub fn take_block_channel(&self) -> Option<mpsc::Receiver<BlockHeader>> {
        self.block_rx.lock().take()
    }

    /// Take the transaction-log stream. Yields `None` after the first call.
    pub fn take_logs_channel(&self) -> Option<mpsc::Receiver<TransactionLog>> {
        self.logs_rx.lock().take()
    }

    /// Take the error stream. Yields `None` after the first call.
    pub fn take_error_channel(&self) -> Option<mpsc::Receiver<CollectorError>> {
        self.error_rx.lock().take()
    }

    /// Drop and routing counters.
    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            dropped_blocks: self.counters.dropped_blocks.load(Ordering::Relaxed),
            dropped_logs: self.counters.dropped_logs.load(Ordering::Relaxed),
            dropped_errors: self.counters.dropped_errors.load(Ordering::Relaxed),
            unrouted_frames: self.counters.unrouted_frames.load(Ordering::Relaxed),
            parse_errors: self.counters.parse_errors.load(Ordering::Relaxed),
        }
    }

    /// TPS of the most recent block over the nominal block time.
    pub fn instant_tps(&self) -> f64 {
        let state = self.inner.read();
        match state.recent_blocks.back() {
            Some(block) => block.tx_count as f64 / BLOCK_TIME_SECS,
            None => 0.0,
        }
    }

    /// TPS across the recent-blocks window, spanning first to last block
    /// timestamp; falls back to `(len - 1) * block_time` when the span is
    /// not positive.
    pub fn average_tps(&self) -> f64 {
        let state = self.inner.read();
        let blocks = &state.recent_blocks;
        if blocks.len() < 2 {
            return 0.0;
        }

        let total_tx: u64 = blocks.iter().map(|b| b.tx_count).sum();
        let first = blocks.front().expect("window is non-empty");
        let last = blocks.back().expect("window is non-empty");

        let mut span = last.timestamp as f64 - first.timestamp as f64;
        if span <= 0.0 {
            span = (blocks.len() - 1) as f64 * BLOCK_TIME_SECS;
        }
        total_tx as f64 / span
    }

    /// Transactions observed in the last second of block timestamps.
    pub fn one_second_tps(&self) -> f64 {
        let state = self.inner.read();
        let blocks = &state.recent_blocks;
        if blocks.len() < 2 {
            return 0.0;
        }

        let last_ts = blocks.back().expect("window is non-empty").timestamp;
        let cutoff = last_ts.saturating_sub(1);

        let mut total_tx = 0u64;
        for block in blocks.iter().rev() {
            if block.timestamp >= cutoff {
                total_tx += block.tx_count;
            } else {
                break;
            }
        }
        total_tx as f64
    }

    /// Append one chart point. Called exactly once per newly observed block,
    /// never on wall-clock ticks.
    pub fn push_tps_history(&self, one_second: f64, average: f64, instant: f64, tx_count: u64) {
        let mut state = self.inner.write();
        state
            .tps_history
            .push_back([one_second, 0.0, average, instant, tx_count as f64]);
        while state.tps_history.len() > MAX_TPS_HISTORY {
            state.tps_history.pop_front();
        }
    }

    /// Copy of the chart history buffer.
    pub fn tps_history(&self) -> Vec<[f64; 5]> {
        self.inner.read().tps_history.iter().copied().collect()
    }

    async fn listen(self: Arc<Self>, mut socket: WsStream, mut heads_id: String, mut logs_id: String) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    unsubscribe(&mut socket, &heads_id, &logs_id).await;
                    let _ = socket.close(None).await;
                    self.inner.write().connected = false;
                    info!("subscription listener stopped");
                    return;
                }
                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            Self::route_frame(&self, &text, &heads_id, &logs_id);
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("upstream closed the subscription socket");
                            match self.reconnect().await {
                                Some((s, h, l)) => {
                                    socket = s;
                                    heads_id = h;
                                    logs_id = l;
                                }
                                None => return,
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            error!(error = %err, "error reading subscription socket");
                            self.report_error(CollectorError::WebSocket(err));
                            match self.reconnect().await {
                                Some((s, h, l)) => {
                                    socket = s;
                                    heads_id = h;
                                    logs_id = l;
                                }
                                None => return,
                            }
                        }
                    }
                }
            }
        }
    }

    /// Re-dial until cancelled; returns the new socket and subscription ids.
    async fn reconnect(&self) -> Option<(WsStream, String, String)> {
        self.inner.write().connected = false;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
            match handshake(&self.ws_url).await {
                Ok((socket, heads_id, logs_id)) => {
                    monpulse_metrics::collectors::RECONNECTS.inc();
                    info!(heads = %heads_id, logs = %logs_id, "resubscribed after reconnect");
                    self.inner.write().connected = true;
                    return Some((socket, heads_id, logs_id));
                }
                Err(err) => {
                    warn!(error = %err, "reconnect attempt failed");
                }
            }
        }
    }

    fn route_frame(this: &Arc<Self>, text: &str, heads_id: &str, logs_id: &str) {
        let frame: UpstreamFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                this.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "discarding unparseable frame");
                return;
            }
        };

        match frame {
            UpstreamFrame::Event { method, params } if method == "eth_subscription" => {
                if params.subscription == heads_id {
                    Self::handle_head(this, params.result);
                } else if params.subscription == logs_id {
                    this.handle_log(params.result);
                } else {
                    this.counters.unrouted_frames.fetch_add(1, Ordering::Relaxed);
                    debug!(subscription = %params.subscription, "frame for unknown subscription");
                }
            }
            UpstreamFrame::Event { .. } | UpstreamFrame::Other(_) => {}
        }
    }

    fn handle_head(this: &Arc<Self>, payload: serde_json::Value) {
        let head: HeadPayload = match serde_json::from_value(payload) {
            Ok(head) => head,
            Err(err) => {
                this.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "failed to parse newHeads payload");
                return;
            }
        };

        let header = BlockHeader {
            number: head.number,
            hash: head.hash,
            timestamp: head.timestamp,
            tx_count: head.transactions.map(|t| t.len() as u64).unwrap_or(0),
            gas_used: head.gas_used.unwrap_or(0),
        };

        debug!(number = header.number, hash = header.short_hash(), "received new block, enriching");
        this.inner.write().latest_block = Some(header.clone());

        let subscriber = Arc::clone(this);
        tokio::spawn(async move {
            subscriber.enrich_and_publish(header).await;
        });
    }

    async fn enrich_and_publish(self: Arc<Self>, mut header: BlockHeader) {
        match self.rpc.block_tx_count(header.number).await {
            Ok(tx_count) => {
                header.tx_count = tx_count;
                {
                    let mut state = self.inner.write();
                    if state.latest_block.as_ref().map(|b| b.number) == Some(header.number) {
                        state.latest_block = Some(header.clone());
                    }
                    state.recent_blocks.push_back(BlockTxInfo {
                        timestamp: header.timestamp,
                        tx_count,
                    });
                    while state.recent_blocks.len() > MAX_RECENT_BLOCKS {
                        state.recent_blocks.pop_front();
                    }
                }

                debug!(
                    number = header.number,
                    epoch = header.number / BLOCKS_PER_EPOCH,
                    instant_tps = self.instant_tps(),
                    avg_tps = self.average_tps(),
                    txs = tx_count,
                    "enriched block"
                );
            }
            Err(err) => {
                warn!(number = header.number, error = %err, "block enrichment failed");
            }
        }

        monpulse_metrics::collectors::BLOCKS_OBSERVED.inc();
        if self.block_tx.try_send(header).is_err() {
            self.counters.dropped_blocks.fetch_add(1, Ordering::Relaxed);
            monpulse_metrics::collectors::CHANNEL_DROPS
                .with_label_values(&["blocks"])
                .inc();
            warn!("block channel full, skipping block");
        }
    }

    fn handle_log(&self, payload: serde_json::Value) {
        let log: TransactionLog = match serde_json::from_value(payload) {
            Ok(log) => log,
            Err(err) => {
                self.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "failed to parse log payload");
                return;
            }
        };

        if self.logs_tx.try_send(log).is_err() {
            self.counters.dropped_logs.fetch_add(1, Ordering::Relaxed);
            monpulse_metrics::collectors::CHANNEL_DROPS
                .with_label_values(&["logs"])
                .inc();
        }
    }

    fn report_error(&self, err: CollectorError) {
        if self.error_tx.try_send(err).is_err() {
            self.counters.dropped_errors.fetch_add(1, Ordering::Relaxed);
            monpulse_metrics::collectors::CHANNEL_DROPS
                .with_label_values(&["errors"])
                .inc();
        }
    }

    #[cfg(test)]
    fn push_recent(&self, timestamp: u64, tx_count: u64) {
        let mut state = self.inner.write();
        state.recent_blocks.push_back(BlockTxInfo { timestamp, tx_count });
        while state.recent_blocks.len() > MAX_RECENT_BLOCKS {
            state.recent_blocks.pop_front();
        }
    }
}

/// Dial and subscribe to `newHeads` then `monadLogs`, returning the socket
/// and both subscription ids.
async fn handshake(ws_url: &str) -> Result<(WsStream, String, String), CollectorError> {
    let (mut socket, _) = connect_async(ws_url).await?;
    let heads_id = subscribe_stream(&mut socket, 1, json!(["newHeads"])).await?;
    let logs_id = subscribe_stream(&mut socket, 2, json!(["monadLogs", {}])).await?;
    Ok((socket, heads_id, logs_id))
}

async fn subscribe_stream(
    socket: &mut WsStream,
    id: u64,
    params: serde_json::Value,
) -> Result<String, CollectorError> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "eth_subscribe",
        "params": params,
    });
    socket
        .send(Message::Text(serde_json::to_string(&request)?))
        .await?;

    while let Some(frame) = socket.next().await {
        let frame = frame?;
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(reply) = serde_json::from_str::<HandshakeReply>(&text) else {
            continue;
        };
        if reply.id != id {
            continue;
        }
        return reply
            .result
            .as_ref()
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                CollectorError::Handshake(format!(
                    "subscribe reply {id} carried no subscription id"
                ))
            });
    }
    Err(CollectorError::Handshake(
        "socket closed during handshake".to_string(),
    ))
}

/// Best-effort unsubscribe for both streams.
async fn unsubscribe(socket: &mut WsStream, heads_id: &str, logs_id: &str) {
    for (id, subscription) in [(3u64, heads_id), (4u64, logs_id)] {
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_unsubscribe",
            "params": [subscription],
        });
        if let Ok(text) = serde_json::to_string(&request) {
            let _ = socket.send(Message::Text(text)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subscriber() -> Arc<BlockSubscriber> {
        let rpc = Arc::new(NodeRpcClient::new("http://127.0.0.1:8080").expect("client"));
        Arc::new(BlockSubscriber::new("ws://127.0.0.1:8081", rpc))
    }

    #[test]
    fn test_tps_with_empty_window() {
        let subscriber = test_subscriber();
        assert_eq!(subscriber.instant_tps(), 0.0);
        assert_eq!(subscriber.average_tps(), 0.0);
        assert_eq!(subscriber.one_second_tps(), 0.0);
    }

    #[test]
    fn test_instant_tps_uses_latest_block() {
        let subscriber = test_subscriber();
        subscriber.push_recent(100, 40);
        subscriber.push_recent(101, 80);
        assert_eq!(subscriber.instant_tps(), 80.0 / 0.4);
    }

    #[test]
    fn test_average_tps_over_span() {
        let subscriber = test_subscriber();
        subscriber.push_recent(100, 40);
        subscriber.push_recent(102, 40);
        subscriber.push_recent(104, 40);
        // 120 transactions over 4 seconds.
        assert_eq!(subscriber.average_tps(), 30.0);
    }

    #[test]
    fn test_average_tps_fallback_on_equal_timestamps() {
        let subscriber = test_subscriber();
        subscriber.push_recent(100, 40);
        subscriber.push_recent(100, 40);
        // Span is zero, so the nominal block time carries: 80 / (1 * 0.4).
        assert_eq!(subscriber.average_tps(), 200.0);
    }

    #[test]
    fn test_one_second_tps_sums_recent_second() {
        let subscriber = test_subscriber();
        subscriber.push_recent(97, 10);
        subscriber.push_recent(99, 20);
        subscriber.push_recent(100, 30);
        subscriber.push_recent(100, 40);
        // Cutoff is 99; the block at 97 is excluded.
        assert_eq!(subscriber.one_second_tps(), 90.0);
    }

    #[test]
    fn test_recent_window_is_bounded_fifo() {
        let subscriber = test_subscriber();
        for i in 0..(MAX_RECENT_BLOCKS as u64 + 5) {
            subscriber.push_recent(100 + i, i);
        }
        let state = subscriber.inner.read();
        assert_eq!(state.recent_blocks.len(), MAX_RECENT_BLOCKS);
        assert_eq!(state.recent_blocks.front().map(|b| b.tx_count), Some(5));
    }

    #[test]
    fn test_tps_history_appends_five_tuples_and_caps() {
        let subscriber = test_subscriber();
        for i in 0..(MAX_TPS_HISTORY + 3) {
            subscriber.push_tps_history(1.0, 2.0, 3.0, i as u64);
        }
        let history = subscriber.tps_history();
        assert_eq!(history.len(), MAX_TPS_HISTORY);
        let last = history.last().expect("history is non-empty");
        assert_eq!(last[1], 0.0);
        assert_eq!(last[4], (MAX_TPS_HISTORY + 2) as f64);
    }

    #[test]
    fn test_unknown_subscription_id_is_discarded() {
        let subscriber = test_subscriber();
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xdeadbeef",
                "result": {"number": "0x1", "timestamp": "0x1", "hash": "0x2"}
            }
        })
        .to_string();

        BlockSubscriber::route_frame(&subscriber, &frame, "0xaaaa", "0xbbbb");

        assert_eq!(subscriber.stats().unrouted_frames, 1);
        assert!(subscriber.latest_block().is_none());
        let mut blocks = subscriber.take_block_channel().expect("first take");
        assert!(blocks.try_recv().is_err());
    }

    #[test]
    fn test_non_subscription_frames_are_ignored() {
        let subscriber = test_subscriber();
        BlockSubscriber::route_frame(&subscriber, r#"{"jsonrpc":"2.0","id":9,"result":true}"#, "0xa", "0xb");
        BlockSubscriber::route_frame(&subscriber, "not json at all", "0xa", "0xb");

        let stats = subscriber.stats();
        assert_eq!(stats.unrouted_frames, 0);
        assert_eq!(stats.parse_errors, 1);
    }

    #[test]
    fn test_head_payload_parsing() {
        let head: HeadPayload = serde_json::from_value(json!({
            "number": "0x64",
            "hash": "0xabc",
            "timestamp": "0x5f5e100",
            "gasUsed": "0x5208"
        }))
        .expect("payload parses");
        assert_eq!(head.number, 100);
        assert_eq!(head.gas_used, Some(21000));
        assert!(head.transactions.is_none());
    }
}
