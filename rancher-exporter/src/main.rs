//! Rancher exporter
//!
//! Serves the state of Rancher services, stacks and hosts as Prometheus
//! metrics. Every request to the metrics path queries the Rancher API and
//! rebuilds the gauges from scratch.

#![forbid(unsafe_code)]

mod client;
mod compat;
mod config;
mod directory;
mod exporter;
mod http_api;
mod metrics;
mod reconcile;
mod sink;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use rancher_common::{LogConfig, init_logging};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use client::MetadataClient;
use config::{Cli, ExporterConfig};
use exporter::Exporter;
use sink::{MetricSink, PrometheusSink};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let mut log_config = LogConfig::from_env("info");
    if let Some(level) = cli.log_level.as_deref() {
        log_config = log_config.with_level(level);
    }
    let _logging_guards = init_logging(&log_config)?;

    let config = ExporterConfig::from_cli(&cli).context("Invalid configuration")?;

    info!(
        base_url = %config.base_url,
        authenticated = config.credentials.is_some(),
        hide_system = config.hide_system,
        listen_address = %config.listen_address,
        metrics_path = %config.metrics_path,
        api_timeout_secs = config.api_timeout.as_secs(),
        "Starting Rancher exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Register Prometheus metrics
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register some metrics: {}", e);
    }
    metrics::set_build_info(env!("CARGO_PKG_VERSION"));

    let client = MetadataClient::new(config.api_timeout, config.credentials.clone())
        .context("Failed to build HTTP client")?;
    let sink = PrometheusSink::new().context("Failed to create metric registry")?;
    info!(metrics = ?sink.describe(), "Resource metrics registered");

    let exporter = Arc::new(Exporter::new(config.scrape_settings(), client, sink));

    let http_state = http_api::HttpState {
        exporter,
        metrics_path: config.metrics_path.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
    };
    http_api::serve(config.listen_address, http_state)
        .await
        .with_context(|| format!("HTTP server on {} failed", config.listen_address))?;

    info!("Exporter stopped");
    Ok(())
}
