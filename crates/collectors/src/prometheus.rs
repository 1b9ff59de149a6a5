//! Prometheus text-format collector.
//!
//! Scrapes the node's OTEL-exported metrics endpoint every five seconds and
//! keeps the latest cumulative counters together with per-counter rates.
//! Rates need one step of history, so the first successful scrape reports
//! zeros.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::CollectorError;

/// Scrape period.
pub const SCRAPE_PERIOD: Duration = Duration::from_secs(5);

/// Per-request timeout.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum snapshot age before `is_healthy` reports false.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(10);

/// Rates are not derived across gaps longer than this (3 scrape periods);
/// extrapolating over a stall would smear a burst into a false steady rate.
const MAX_RATE_GAP_SECS: f64 = 15.0;

const METRIC_TX_COMMITS: &str = "monad_execution_ledger_num_tx_commits";
const METRIC_BLOCKS_COMMITTED: &str = "monad_execution_ledger_num_blocks_committed";
const METRIC_INSERT_OWNED: &str = "monad_eth_txpool_insert_owned_txs";
const METRIC_INSERT_FORWARDED: &str = "monad_eth_txpool_insert_forwarded_txs";
const METRIC_DROP_INVALID_SIGNATURE: &str = "monad_eth_txpool_drop_invalid_signature";
const METRIC_DROP_NONCE_TOO_LOW: &str = "monad_eth_txpool_drop_nonce_too_low";
const METRIC_DROP_FEE_TOO_LOW: &str = "monad_eth_txpool_drop_fee_too_low";
const METRIC_DROP_INSUFFICIENT_BALANCE: &str = "monad_eth_txpool_drop_insufficient_balance";
const METRIC_DROP_POOL_FULL: &str = "monad_eth_txpool_drop_pool_full";
const METRIC_PENDING_TXS: &str = "monad_eth_txpool_pending_txs";
const METRIC_TRACKED_TXS: &str = "monad_eth_txpool_tracked_txs";

/// One successful scrape: cumulative totals, gauges, and derived rates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrometheusSnapshot {
    /// Cumulative transaction commits.
    pub tx_commits_total: f64,
    /// Cumulative blocks committed.
    pub blocks_committed: f64,
    /// Cumulative pool inserts via local RPC.
    pub insert_owned_txs: f64,
    /// Cumulative pool inserts forwarded from peers.
    pub insert_forwarded_txs: f64,
    /// Cumulative drops: invalid signature.
    pub drop_invalid_signature: f64,
    /// Cumulative drops: nonce too low.
    pub drop_nonce_too_low: f64,
    /// Cumulative drops: fee too low.
    pub drop_fee_too_low: f64,
    /// Cumulative drops: insufficient balance.
    pub drop_insufficient_balance: f64,
    /// Cumulative drops: pool full.
    pub drop_pool_full: f64,
    /// Gauge: transactions in the pending pool.
    pub pending_txs: f64,
    /// Gauge: transactions in the tracked pool.
    pub tracked_txs: f64,

    /// Commits per second since the previous scrape. This is the TPS.
    pub tps: f64,
    /// Owned-insert rate per second.
    pub insert_owned_rate: f64,
    /// Forwarded-insert rate per second.
    pub insert_forwarded_rate: f64,
    /// Invalid-signature drop rate per second.
    pub drop_invalid_signature_rate: f64,
    /// Nonce-too-low drop rate per second.
    pub drop_nonce_too_low_rate: f64,
    /// Fee-too-low drop rate per second.
    pub drop_fee_too_low_rate: f64,
    /// Insufficient-balance drop rate per second.
    pub drop_insufficient_balance_rate: f64,
    /// Pool-full drop rate per second.
    pub drop_pool_full_rate: f64,

    /// When the snapshot was taken. `None` until the first success.
    pub last_updated: Option<Instant>,
}

/// Parse one text-format document into raw counter and gauge values.
///
/// Lines beginning with `#` and blank lines are skipped. The first
/// whitespace-delimited token, truncated at `{`, is the metric name; the
/// second is the value. Unknown names and unparseable values are ignored;
/// when multiple series share a name, the last line wins.
pub fn parse_document(document: &str) -> PrometheusSnapshot {
    let mut snapshot = PrometheusSnapshot::default();

    for line in document.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(name_part), Some(value_part)) = (parts.next(), parts.next()) else {
            continue;
        };
        let name = name_part.split('{').next().unwrap_or(name_part);
        let Ok(value) = value_part.parse::<f64>() else {
            continue;
        };

        match name {
            METRIC_TX_COMMITS => snapshot.tx_commits_total = value,
            METRIC_BLOCKS_COMMITTED => snapshot.blocks_committed = value,
            METRIC_INSERT_OWNED => snapshot.insert_owned_txs = value,
            METRIC_INSERT_FORWARDED => snapshot.insert_forwarded_txs = value,
            METRIC_DROP_INVALID_SIGNATURE => snapshot.drop_invalid_signature = value,
            METRIC_DROP_NONCE_TOO_LOW => snapshot.drop_nonce_too_low = value,
            METRIC_DROP_FEE_TOO_LOW => snapshot.drop_fee_too_low = value,
            METRIC_DROP_INSUFFICIENT_BALANCE => snapshot.drop_insufficient_balance = value,
            METRIC_DROP_POOL_FULL => snapshot.drop_pool_full = value,
            METRIC_PENDING_TXS => snapshot.pending_txs = value,
            METRIC_TRACKED_TXS => snapshot.tracked_txs = value,
            _ => {}
        }
    }

    snapshot
}

/// Parse a document and derive rates against the previous snapshot.
///
/// Rates stay zero when there is no usable history: first scrape, a
/// non-positive time delta, or a gap longer than [`MAX_RATE_GAP_SECS`]. A
/// counter that decreased (process restart) yields a zero rate for that
/// sample rather than a negative one.
pub fn next_snapshot(
    prev: &PrometheusSnapshot,
    document: &str,
    delta_secs: f64,
) -> PrometheusSnapshot {
    let mut next = parse_document(document);

    if prev.tx_commits_total > 0.0 && delta_secs > 0.0 && delta_secs <= MAX_RATE_GAP_SECS {
        let rate = |new: f64, old: f64| {
            let delta = new - old;
            if delta < 0.0 {
                0.0
            } else {
                delta / delta_secs
            }
        };

        next.tps = rate(next.tx_commits_total, prev.tx_commits_total);
        next.insert_owned_rate = rate(next.insert_owned_txs, prev.insert_owned_txs);
        next.insert_forwarded_rate = rate(next.insert_forwarded_txs, prev.insert_forwarded_txs);
        next.drop_invalid_signature_rate =
            rate(next.drop_invalid_signature, prev.drop_invalid_signature);
        next.drop_nonce_too_low_rate = rate(next.drop_nonce_too_low, prev.drop_nonce_too_low);
        next.drop_fee_too_low_rate = rate(next.drop_fee_too_low, prev.drop_fee_too_low);
        next.drop_insufficient_balance_rate =
            rate(next.drop_insufficient_balance, prev.drop_insufficient_balance);
        next.drop_pool_full_rate = rate(next.drop_pool_full, prev.drop_pool_full);
    }

    next
}

/// Periodic collector for the node's Prometheus endpoint.
pub struct PrometheusCollector {
    endpoint: String,
    client: reqwest::Client,
    snapshot: RwLock<PrometheusSnapshot>,
}

impl PrometheusCollector {
    /// Create a collector for the given endpoint. No request is made yet.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            endpoint: endpoint.into(),
            client,
            snapshot: RwLock::new(PrometheusSnapshot::default()),
        }
    }

    /// Run the first scrape, then begin background collection.
    ///
    /// Returns the first scrape's error without starting the background
    /// task, so the caller can fall back to other sources.
    pub async fn start(self: Arc<Self>) -> Result<(), CollectorError> {
        self.scrape_once().await?;

        let collector = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCRAPE_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = collector.scrape_once().await {
                    monpulse_metrics::collectors::SCRAPE_FAILURES.inc();
                    warn!(error = %err, "prometheus scrape failed");
                }
            }
        });

        Ok(())
    }

    async fn scrape_once(&self) -> Result<(), CollectorError> {
        let response = self.client.get(&self.endpoint).send().await?;
        if !response.status().is_success() {
            return Err(CollectorError::HttpStatus(response.status().as_u16()));
        }
        let body = response.text().await?;

        let now = Instant::now();
        let prev = *self.snapshot.read();
        let delta_secs = prev
            .last_updated
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(0.0);

        let mut next = next_snapshot(&prev, &body, delta_secs);
        next.last_updated = Some(now);

        if next.tps > 0.0 {
            debug!(
                tps = next.tps,
                commits = next.tx_commits_total,
                delta_secs,
                "prometheus scrape derived rates"
            );
        }

        *self.snapshot.write() = next;
        Ok(())
    }

    /// Copy of the latest snapshot.
    pub fn snapshot(&self) -> PrometheusSnapshot {
        *self.snapshot.read()
    }

    /// Commits-per-second rate from the latest snapshot.
    pub fn tps(&self) -> f64 {
        self.snapshot.read().tps
    }

    /// True when the last successful scrape is within the freshness window.
    pub fn is_healthy(&self) -> bool {
        self.snapshot
            .read()
            .last_updated
            .map(|t| t.elapsed() < FRESHNESS_WINDOW)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "\
# HELP monad_execution_ledger_num_tx_commits Total committed transactions
# TYPE monad_execution_ledger_num_tx_commits counter
monad_execution_ledger_num_tx_commits 150
monad_eth_txpool_insert_owned_txs{source=\"rpc\"} 20 1700000000000
monad_eth_txpool_insert_forwarded_txs 5
monad_eth_txpool_pending_txs 42
monad_eth_txpool_tracked_txs 99
unrelated_metric 7
not-a-valid-line
monad_eth_txpool_drop_invalid_signature nan-ish
";

    #[test]
    fn test_parse_document_maps_known_names() {
        let snapshot = parse_document(DOCUMENT);
        assert_eq!(snapshot.tx_commits_total, 150.0);
        assert_eq!(snapshot.insert_owned_txs, 20.0);
        assert_eq!(snapshot.insert_forwarded_txs, 5.0);
        assert_eq!(snapshot.pending_txs, 42.0);
        assert_eq!(snapshot.tracked_txs, 99.0);
        // Unparseable value line is skipped, leaving the default.
        assert_eq!(snapshot.drop_invalid_signature, 0.0);
    }

    #[test]
    fn test_parse_document_is_idempotent() {
        assert_eq!(parse_document(DOCUMENT), parse_document(DOCUMENT));
    }

    #[test]
    fn test_parse_document_last_line_wins() {
        let doc = "monad_eth_txpool_pending_txs{pool=\"a\"} 1\nmonad_eth_txpool_pending_txs{pool=\"b\"} 2\n";
        assert_eq!(parse_document(doc).pending_txs, 2.0);
    }

    #[test]
    fn test_rates_from_consecutive_scrapes() {
        let prev = parse_document(
            "monad_execution_ledger_num_tx_commits 100\nmonad_eth_txpool_insert_owned_txs 10\n",
        );
        let next = next_snapshot(
            &prev,
            "monad_execution_ledger_num_tx_commits 150\nmonad_eth_txpool_insert_owned_txs 20\n",
            5.0,
        );
        assert_eq!(next.tps, 10.0);
        assert_eq!(next.insert_owned_rate, 2.0);
        assert_eq!(next.insert_forwarded_rate, 0.0);
    }

    #[test]
    fn test_first_scrape_reports_zero_rates() {
        let prev = PrometheusSnapshot::default();
        let next = next_snapshot(&prev, "monad_execution_ledger_num_tx_commits 100\n", 5.0);
        assert_eq!(next.tps, 0.0);
        assert_eq!(next.tx_commits_total, 100.0);
    }

    #[test]
    fn test_non_positive_delta_yields_zero_not_nan() {
        let prev = parse_document("monad_execution_ledger_num_tx_commits 100\n");
        let next = next_snapshot(&prev, "monad_execution_ledger_num_tx_commits 150\n", 0.0);
        assert_eq!(next.tps, 0.0);
        assert!(!next.tps.is_nan());
    }

    #[test]
    fn test_counter_reset_yields_zero_rate() {
        let prev = parse_document("monad_execution_ledger_num_tx_commits 100\n");
        let next = next_snapshot(&prev, "monad_execution_ledger_num_tx_commits 40\n", 5.0);
        assert_eq!(next.tps, 0.0);
    }

    #[test]
    fn test_no_extrapolation_over_long_gaps() {
        let prev = parse_document("monad_execution_ledger_num_tx_commits 100\n");
        let next = next_snapshot(&prev, "monad_execution_ledger_num_tx_commits 700\n", 60.0);
        assert_eq!(next.tps, 0.0);
    }
}
