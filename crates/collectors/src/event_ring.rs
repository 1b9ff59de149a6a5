//! Execution event-ring reader.
//!
//! Streams framed execution events from the node's event socket: a fixed
//! 64-byte little-endian header (sequence number, timestamp, event type,
//! payload size, transaction id, reserved tail) followed by a JSON payload.
//! Sequence-number gaps are counted as missed events and the stream
//! continues with the next frame.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CollectorError;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Event channel capacity; sized for high-throughput bursts.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Per-read deadline.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Event type: transaction execution started.
pub const EVENT_TRANSACTION_START: u32 = 1;
/// Event type: transaction execution finished.
pub const EVENT_TRANSACTION_END: u32 = 2;
/// Event type: state read.
pub const EVENT_STATE_READ: u32 = 3;
/// Event type: state write.
pub const EVENT_STATE_WRITE: u32 = 4;
/// Event type: log emitted.
pub const EVENT_LOG_EMITTED: u32 = 5;
/// Event type: contract call.
pub const EVENT_CONTRACT_CALL: u32 = 6;
/// Event type: gas usage report.
pub const EVENT_GAS_USAGE: u32 = 7;
/// Event type: execution error.
pub const EVENT_ERROR: u32 = 8;

/// Fixed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Monotonic sequence number assigned by the node.
    pub sequence: u64,
    /// Event timestamp, nanoseconds.
    pub timestamp: u64,
    /// Event type discriminant.
    pub event_type: u32,
    /// Length of the payload that follows.
    pub payload_size: u32,
    /// Transaction the event belongs to.
    pub transaction_id: [u8; 32],
}

/// Parse a header from its fixed 64-byte encoding.
pub fn parse_header(bytes: &[u8; HEADER_SIZE]) -> EventHeader {
    let mut transaction_id = [0u8; 32];
    transaction_id.copy_from_slice(&bytes[24..56]);
    EventHeader {
        sequence: u64::from_le_bytes(bytes[0..8].try_into().expect("slice is 8 bytes")),
        timestamp: u64::from_le_bytes(bytes[8..16].try_into().expect("slice is 8 bytes")),
        event_type: u32::from_le_bytes(bytes[16..20].try_into().expect("slice is 4 bytes")),
        payload_size: u32::from_le_bytes(bytes[20..24].try_into().expect("slice is 4 bytes")),
        transaction_id,
    }
}

/// Transaction-start payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStart {
    /// Sender address.
    #[serde(default)]
    pub sender: String,
    /// Destination address.
    #[serde(default)]
    pub to: String,
    /// Gas limit.
    #[serde(default)]
    pub gas_limit: u64,
    /// Gas price.
    #[serde(default)]
    pub gas_price: u64,
    /// Transferred value, decimal string.
    #[serde(default)]
    pub value: String,
    /// Call data, hex string.
    #[serde(default)]
    pub data: String,
}

/// Transaction-end payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnd {
    /// Whether execution succeeded.
    #[serde(default)]
    pub success: bool,
    /// Gas consumed.
    #[serde(default)]
    pub gas_used: u64,
    /// EVM exit code.
    #[serde(default)]
    pub exit_code: u32,
    /// Execution duration, nanoseconds.
    #[serde(default)]
    pub duration_ns: u64,
}

/// State read/write payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Touched account address.
    #[serde(default)]
    pub address: String,
    /// Storage key.
    #[serde(default)]
    pub key: String,
    /// Previous value.
    #[serde(default)]
    pub old_value: String,
    /// New value.
    #[serde(default)]
    pub new_value: String,
}

/// Emitted-log payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Emitting contract address.
    #[serde(default)]
    pub address: String,
    /// Log topics.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Log data.
    #[serde(default)]
    pub data: String,
}

/// Decoded event payload, one variant per known event type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Transaction execution started.
    TransactionStart(TransactionStart),
    /// Transaction execution finished.
    TransactionEnd(TransactionEnd),
    /// State read.
    StateRead(StateChange),
    /// State write.
    StateWrite(StateChange),
    /// Log emitted.
    LogEmitted(LogEvent),
    /// Frame carried no payload.
    Empty,
    /// Unknown or undecodable event type; header still counts.
    Unknown {
        /// The raw event type discriminant.
        event_type: u32,
    },
}

/// Decode a payload by event type. Unknown types are preserved, not errors.
pub fn parse_payload(event_type: u32, payload: &[u8]) -> Result<EventPayload, serde_json::Error> {
    if payload.is_empty() {
        return Ok(EventPayload::Empty);
    }
    match event_type {
        EVENT_TRANSACTION_START => Ok(EventPayload::TransactionStart(serde_json::from_slice(
            payload,
        )?)),
        EVENT_TRANSACTION_END => Ok(EventPayload::TransactionEnd(serde_json::from_slice(
            payload,
        )?)),
        EVENT_STATE_READ => Ok(EventPayload::StateRead(serde_json::from_slice(payload)?)),
        EVENT_STATE_WRITE => Ok(EventPayload::StateWrite(serde_json::from_slice(payload)?)),
        EVENT_LOG_EMITTED => Ok(EventPayload::LogEmitted(serde_json::from_slice(payload)?)),
        other => Ok(EventPayload::Unknown { event_type: other }),
    }
}

/// One decoded execution event.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEvent {
    /// Frame header.
    pub header: EventHeader,
    /// Decoded payload.
    pub payload: EventPayload,
}

/// Status bag served at `/api/v1/event-rings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventRingStats {
    /// Whether the socket is currently connected.
    pub connected: bool,
    /// Events successfully framed.
    pub events_received: u64,
    /// Header and payload bytes consumed.
    pub bytes_received: u64,
    /// Events skipped by sequence gaps.
    pub missed_events: u64,
    /// Payloads that failed to decode.
    pub parse_errors: u64,
    /// Highest sequence number seen.
    pub last_sequence: u64,
    /// Events buffered in the channel right now.
    pub buffer_size: u64,
}

/// Reader for the node's execution event ring.
pub struct EventRingReader {
    path: PathBuf,
    connected: AtomicBool,
    last_sequence: AtomicU64,
    events_received: AtomicU64,
    bytes_received: AtomicU64,
    missed_events: AtomicU64,
    parse_errors: AtomicU64,
    dropped_events: AtomicU64,
    event_tx: mpsc::Sender<ExecutionEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<ExecutionEvent>>>,
    cancel: CancellationToken,
}

impl EventRingReader {
    /// Create a reader for the given socket path. Nothing is dialed yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            connected: AtomicBool::new(false),
            last_sequence: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            missed_events: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Connect and spawn the background read loop.
    pub async fn connect(self: Arc<Self>) -> Result<(), CollectorError> {
        let stream = UnixStream::connect(&self.path).await?;
        self.connected.store(true, Ordering::Relaxed);
        info!(path = %self.path.display(), "connected to execution event ring");

        let reader = Arc::clone(&self);
        tokio::spawn(async move {
            reader.read_loop(stream).await;
        });
        Ok(())
    }

    /// Stop the read loop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Take the event stream. Yields `None` after the first call.
    pub fn take_event_channel(&self) -> Option<mpsc::Receiver<ExecutionEvent>> {
        self.event_rx.lock().take()
    }

    /// Current reader statistics.
    pub fn stats(&self) -> EventRingStats {
        let buffered = self
            .event_tx
            .max_capacity()
            .saturating_sub(self.event_tx.capacity()) as u64;
        EventRingStats {
            connected: self.connected.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            missed_events: self.missed_events.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            last_sequence: self.last_sequence.load(Ordering::Relaxed),
            buffer_size: buffered,
        }
    }

    async fn read_loop(self: Arc<Self>, mut stream: UnixStream) {
        let mut header_buf = [0u8; HEADER_SIZE];

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.connected.store(false, Ordering::Relaxed);
                    info!("event ring reader stopped");
                    return;
                }
                read = tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut header_buf)) => {
                    match read {
                        Err(_) => continue, // idle socket, keep waiting
                        Ok(Err(err)) => {
                            warn!(error = %err, "event ring connection lost");
                            self.connected.store(false, Ordering::Relaxed);
                            return;
                        }
                        Ok(Ok(_)) => {}
                    }
                }
            }

            let header = parse_header(&header_buf);
            self.note_sequence(header.sequence);

            let mut payload = vec![0u8; header.payload_size as usize];
            if header.payload_size > 0 {
                if let Err(err) = stream.read_exact(&mut payload).await {
                    warn!(error = %err, "failed to read event payload");
                    self.connected.store(false, Ordering::Relaxed);
                    return;
                }
            }

            let decoded = match parse_payload(header.event_type, &payload) {
                Ok(decoded) => decoded,
                Err(err) => {
                    self.parse_errors.fetch_add(1, Ordering::Relaxed);
                    debug!(event_type = header.event_type, error = %err, "undecodable event payload");
                    EventPayload::Unknown {
                        event_type: header.event_type,
                    }
                }
            };

            self.events_received.fetch_add(1, Ordering::Relaxed);
            self.bytes_received
                .fetch_add((HEADER_SIZE + payload.len()) as u64, Ordering::Relaxed);

            let event = ExecutionEvent {
                header,
                payload: decoded,
            };
            if self.event_tx.try_send(event).is_err() {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                monpulse_metrics::collectors::CHANNEL_DROPS
                    .with_label_values(&["ring"])
                    .inc();
            }
        }
    }

    fn note_sequence(&self, sequence: u64) {
        let last = self.last_sequence.load(Ordering::Relaxed);
        if last > 0 && sequence > last + 1 {
            let missed = sequence - last - 1;
            self.missed_events.fetch_add(missed, Ordering::Relaxed);
            monpulse_metrics::collectors::RING_MISSED_EVENTS.inc_by(missed);
            warn!(from = last, to = sequence, missed, "missed execution events");
        }
        self.last_sequence.store(sequence, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_header(header: &EventHeader) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..8].copy_from_slice(&header.sequence.to_le_bytes());
        bytes[8..16].copy_from_slice(&header.timestamp.to_le_bytes());
        bytes[16..20].copy_from_slice(&header.event_type.to_le_bytes());
        bytes[20..24].copy_from_slice(&header.payload_size.to_le_bytes());
        bytes[24..56].copy_from_slice(&header.transaction_id);
        bytes
    }

    #[test]
    fn test_header_round_trip() {
        let header = EventHeader {
            sequence: 42,
            timestamp: 1_700_000_000_000,
            event_type: EVENT_STATE_WRITE,
            payload_size: 128,
            transaction_id: [7u8; 32],
        };
        assert_eq!(parse_header(&encode_header(&header)), header);
    }

    #[test]
    fn test_parse_payload_by_type() {
        let payload = br#"{"success": true, "gas_used": 21000, "exit_code": 0, "duration_ns": 5000}"#;
        let decoded = parse_payload(EVENT_TRANSACTION_END, payload).unwrap();
        assert_eq!(
            decoded,
            EventPayload::TransactionEnd(TransactionEnd {
                success: true,
                gas_used: 21000,
                exit_code: 0,
                duration_ns: 5000,
            })
        );
    }

    #[test]
    fn test_parse_payload_unknown_type_is_kept() {
        let decoded = parse_payload(99, b"{}").unwrap();
        assert_eq!(decoded, EventPayload::Unknown { event_type: 99 });
    }

    #[test]
    fn test_parse_payload_empty_frame() {
        assert_eq!(
            parse_payload(EVENT_TRANSACTION_START, b"").unwrap(),
            EventPayload::Empty
        );
    }

    #[test]
    fn test_sequence_gap_detection() {
        let reader = EventRingReader::new("/tmp/unused.sock");
        reader.note_sequence(1);
        reader.note_sequence(2);
        assert_eq!(reader.stats().missed_events, 0);

        reader.note_sequence(10);
        assert_eq!(reader.stats().missed_events, 7);
        assert_eq!(reader.stats().last_sequence, 10);
    }

    #[test]
    fn test_first_sequence_is_not_a_gap() {
        let reader = EventRingReader::new("/tmp/unused.sock");
        reader.note_sequence(500);
        assert_eq!(reader.stats().missed_events, 0);
    }
}
