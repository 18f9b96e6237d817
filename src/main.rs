use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use tradesim_rs::models::cost::OrderRequest;
use tradesim_rs::simulator::Simulator;
use tradesim_rs::{telemetry, SimulatorConfig};

#[derive(Debug, Parser)]
#[command(name = "tradesim", about = "Real-time trade cost estimates against a live order book feed")]
struct Cli {
    /// TOML configuration file (optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the feed websocket URL
    #[arg(long)]
    url: Option<String>,

    /// Order size in USD
    #[arg(long, default_value_t = 100.0)]
    order_size: f64,

    #[arg(long, default_value = "VIP0")]
    fee_tier: String,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Prometheus exporter port (metrics-exporter feature only)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_filter);
    telemetry::init_metrics(cli.metrics_port)?;

    let mut config = SimulatorConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.url {
        config.feed.url = url;
    }
    let read_timeout = config.feed.read_timeout();

    let simulator = Simulator::new(config).context("building simulator")?;
    let order = OrderRequest::new(cli.order_size, cli.fee_tier);

    // Feed task: single writer of the shared book
    let ingestor = Arc::new(simulator.ingestor());
    let stop = ingestor.stop_handle();
    let router = simulator.router();
    let feed_task = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.run(&router).await }
    });

    // Poll loop: reader side
    simulator
        .poll_until(&order, simulator.config().poll_interval(), tokio::signal::ctrl_c())
        .await;

    stop.stop();
    // An in-flight read is only bounded by the read timeout
    let abort = feed_task.abort_handle();
    match tokio::time::timeout(read_timeout + Duration::from_secs(1), feed_task).await {
        Ok(joined) => joined.context("feed task panicked")?,
        Err(_) => {
            warn!("Feed task did not stop in time, aborting");
            abort.abort();
        }
    }

    info!("Goodbye!");
    Ok(())
}
