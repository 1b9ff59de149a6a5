//! monpulsed: real-time telemetry gateway for a MonadBFT node.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;

/// Monad telemetry gateway daemon.
#[derive(Parser)]
#[command(name = "monpulsed")]
#[command(version)]
#[command(about = "Real-time telemetry gateway for a MonadBFT node", long_about = None)]
struct Cli {
    /// Port for the HTTP and WebSocket server.
    #[arg(long, default_value_t = 4000)]
    port: u16,

    /// The logging level (trace|debug|info|warn|error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// The logging format (json|plain).
    #[arg(long, default_value = "plain")]
    log_format: String,

    /// Disable colored logs.
    #[arg(long, default_value = "false")]
    log_no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!cli.log_no_color);
    if cli.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    app::run(cli.port).await
}
