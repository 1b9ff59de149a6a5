//! Validator directory client.
//!
//! Fetches the network's validator summary from the public directory API on
//! a slow cadence (the API is rate limited) and keeps a cached copy with
//! fixed fallbacks, feeding the peers handshake message.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::CollectorError;

/// Fetch period.
const FETCH_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Per-request timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum data age before `is_healthy` reports false.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(10 * 60);

const DIRECTORY_BASE_URL: &str = "https://www.gmonads.com/api";

/// Cached validator summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorDirectory {
    /// Total registered validators.
    pub total_validators: u64,
    /// Validators currently active.
    pub active_validators: u64,
    /// Validators currently offline.
    pub offline_validators: u64,
    /// Total stake in MON.
    pub total_stake: f64,
    /// Stake pending activation, in MON.
    pub pending_stake: f64,
    /// Advertised staking APY, percent.
    pub apy: f64,
    /// When the data was last refreshed. `None` until the first success or
    /// fallback.
    pub last_updated: Option<Instant>,
}

impl Default for ValidatorDirectory {
    /// Fixed fallback figures for when the directory is unreachable.
    fn default() -> Self {
        Self {
            total_validators: 89,
            active_validators: 86,
            offline_validators: 3,
            total_stake: 2.24e9,
            pending_stake: 13.87e6,
            apy: 3.52,
            last_updated: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectorySummary {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    active: u64,
    #[serde(default)]
    offline: u64,
    #[serde(default)]
    total_stake: f64,
}

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    summary: DirectorySummary,
}

/// Periodic client for the validator directory API.
pub struct ValidatorDirectoryClient {
    base_url: String,
    network: String,
    client: reqwest::Client,
    data: RwLock<ValidatorDirectory>,
}

impl ValidatorDirectoryClient {
    /// Create a client for the given network name.
    pub fn new(network: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("monpulse/0.1")
            .build()
            .expect("reqwest client");
        Self {
            base_url: DIRECTORY_BASE_URL.to_string(),
            network: network.into(),
            client,
            data: RwLock::new(ValidatorDirectory::default()),
        }
    }

    /// Fetch once (falling back to defaults on failure), then begin
    /// background refreshing.
    pub async fn start(self: Arc<Self>) {
        if let Err(err) = self.fetch_once().await {
            warn!(error = %err, "initial validator directory fetch failed, using fallback data");
            self.data.write().last_updated = Some(Instant::now());
        }

        let directory = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FETCH_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = directory.fetch_once().await {
                    warn!(error = %err, "validator directory fetch failed, keeping cached data");
                }
            }
        });
    }

    async fn fetch_once(&self) -> Result<(), CollectorError> {
        let url = format!(
            "{}/epoch_validators?network={}",
            self.base_url, self.network
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CollectorError::HttpStatus(response.status().as_u16()));
        }
        let parsed: DirectoryResponse = response.json().await?;

        {
            let mut data = self.data.write();
            data.total_validators = parsed.summary.total;
            data.active_validators = parsed.summary.active;
            data.offline_validators = parsed.summary.offline;
            data.total_stake = parsed.summary.total_stake;
            data.last_updated = Some(Instant::now());
        }

        info!(
            total = parsed.summary.total,
            active = parsed.summary.active,
            offline = parsed.summary.offline,
            "refreshed validator directory"
        );
        Ok(())
    }

    /// Copy of the cached summary.
    pub fn directory(&self) -> ValidatorDirectory {
        *self.data.read()
    }

    /// True when the cached data is within the freshness window.
    pub fn is_healthy(&self) -> bool {
        self.data
            .read()
            .last_updated
            .map(|t| t.elapsed() < FRESHNESS_WINDOW)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_defaults() {
        let directory = ValidatorDirectory::default();
        assert_eq!(directory.total_validators, 89);
        assert_eq!(
            directory.active_validators + directory.offline_validators,
            directory.total_validators
        );
    }

    #[test]
    fn test_directory_response_parsing() {
        let response: DirectoryResponse = serde_json::from_str(
            r#"{"validators": [], "summary": {"total": 91, "active": 88, "offline": 3, "total_stake": 2.5e9}}"#,
        )
        .unwrap();
        assert_eq!(response.summary.total, 91);
        assert_eq!(response.summary.total_stake, 2.5e9);
    }
}
