//! Gateway configuration.
//!
//! Explicit value type assembled once at startup from environment variables;
//! upstream addresses that have no deployment-level variance are constants.

use std::path::PathBuf;

/// Environment variable overriding the Prometheus scrape endpoint.
pub const PROMETHEUS_ENDPOINT_ENV: &str = "PROMETHEUS_ENDPOINT";

/// Environment variable overriding the mempool IPC socket path.
pub const IPC_PATH_ENV: &str = "MONAD_IPC_PATH";

/// Default OTEL-exported Prometheus endpoint.
pub const DEFAULT_PROMETHEUS_ENDPOINT: &str = "http://127.0.0.1:8889/metrics";

/// Default mempool IPC socket path.
pub const DEFAULT_IPC_PATH: &str = "/home/monad/monad-bft/mempool.sock";

/// Upstream JSON-RPC WebSocket subscription endpoint.
pub const UPSTREAM_WS_URL: &str = "ws://127.0.0.1:8081";

/// Upstream JSON-RPC HTTP endpoint used for one-off calls.
pub const UPSTREAM_RPC_URL: &str = "http://127.0.0.1:8080";

/// Execution event-ring socket path.
pub const EVENT_RING_PATH: &str = "/tmp/monad-execution-events.sock";

/// Default listen port for the gateway's HTTP and WebSocket server.
pub const DEFAULT_LISTEN_PORT: u16 = 4000;

/// Candidate locations of the node's `node.toml`.
const NODE_CONFIG_PATHS: &[&str] = &[
    "/root/.monad/config/node.toml",
    "../monad-bft/config/node.toml",
    "./config/node.toml",
];

const DEFAULT_NODE_NAME: &str = "Monad Node";

/// Runtime configuration for the gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Prometheus text-format endpoint to scrape.
    pub prometheus_endpoint: String,
    /// Unix socket path for the mempool metrics IPC.
    pub ipc_path: PathBuf,
    /// Upstream WebSocket URL for `eth_subscribe`.
    pub ws_url: String,
    /// Upstream HTTP JSON-RPC URL for enrichment calls.
    pub rpc_url: String,
    /// Execution event-ring socket path.
    pub event_ring_path: PathBuf,
    /// Port the gateway listens on.
    pub listen_port: u16,
    /// Network name passed to the validator directory API.
    pub network: String,
    /// Display name of the observed node.
    pub node_name: String,
}

impl GatewayConfig {
    /// Assemble configuration from the environment, filling defaults.
    pub fn from_env() -> Self {
        Self {
            prometheus_endpoint: std::env::var(PROMETHEUS_ENDPOINT_ENV)
                .unwrap_or_else(|_| DEFAULT_PROMETHEUS_ENDPOINT.to_string()),
            ipc_path: std::env::var(IPC_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_IPC_PATH)),
            ws_url: UPSTREAM_WS_URL.to_string(),
            rpc_url: UPSTREAM_RPC_URL.to_string(),
            event_ring_path: PathBuf::from(EVENT_RING_PATH),
            listen_port: DEFAULT_LISTEN_PORT,
            network: "testnet".to_string(),
            node_name: read_node_name(),
        }
    }
}

/// Read the node display name from the first `node.toml` found.
fn read_node_name() -> String {
    for path in NODE_CONFIG_PATHS {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Some(name) = parse_node_name(&content) {
                return name;
            }
        }
    }
    DEFAULT_NODE_NAME.to_string()
}

/// Extract `node_name = "..."` from TOML-ish content without a full parser.
fn parse_node_name(content: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("node_name") {
            let value = rest.trim_start().strip_prefix('=')?.trim();
            let value = value.trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_name_double_quoted() {
        let content = "chain = \"monad\"\nnode_name = \"validator-7\"\n";
        assert_eq!(parse_node_name(content), Some("validator-7".to_string()));
    }

    #[test]
    fn test_parse_node_name_single_quoted() {
        assert_eq!(
            parse_node_name("node_name = 'alpha'"),
            Some("alpha".to_string())
        );
    }

    #[test]
    fn test_parse_node_name_missing() {
        assert_eq!(parse_node_name("port = 4000"), None);
        assert_eq!(parse_node_name("node_name = \"\""), None);
    }
}
