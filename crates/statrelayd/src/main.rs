//! statrelayd — the metrics collector daemon.
//!
//! Accepts chunked metric streams from producers on `POST /send-metrics`
//! and serves the aggregated Prometheus exposition on `GET /metrics`, both
//! on one port.
//!
//! # Usage
//!
//! ```text
//! statrelayd --port 9394 --prefix app_ --label env=prod
//! statrelayd --config /etc/statrelay.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use statrelay_collector::{Collector, ProcessCollector, WebCollector};
use statrelay_server::{MetricsServer, ServerConfig};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "statrelayd", about = "statrelay metrics collector daemon")]
struct Cli {
    /// TOML configuration file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Port for both ingestion and scraping.
    #[arg(long, short)]
    port: Option<u16>,

    /// Prefix for every exposed metric name.
    #[arg(long)]
    prefix: Option<String>,

    /// Label added to every exposed sample, as key=value. Repeatable.
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Upper bound on collector rendering per scrape.
    #[arg(long)]
    render_timeout_ms: Option<u64>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

impl Cli {
    /// File configuration (or defaults) with flag overrides applied.
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        for (key, value) in &self.labels {
            config.default_labels.insert(key.as_str(), value.as_str());
        }
        if let Some(ms) = self.render_timeout_ms {
            config.render_timeout_ms = ms;
        }
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "info,statrelayd=debug,statrelay_server=debug,statrelay_collector=debug",
        )
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_collector(config: &ServerConfig) -> Collector {
    let mut collector = Collector::new()
        .with_collector(ProcessCollector::new())
        .with_collector(WebCollector::new());
    if let Some(buckets) = &config.histogram_buckets {
        collector = collector.with_default_buckets(buckets.clone());
    }
    collector
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.server_config()?;
    info!(
        bind = %config.bind,
        port = config.port,
        prefix = %config.prefix,
        labels = %config.default_labels,
        "starting statrelayd"
    );

    let server = MetricsServer::bind(&config, Arc::new(build_collector(&config))).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    server
        .serve(shutdown_rx)
        .await
        .context("metrics server failed")
}
