//! State shared by the ingestion path and the scrape handler.

use std::sync::Arc;
use std::time::Duration;

use statrelay_collector::Collector;
use statrelay_metrics::{render_all, RenderContext};
use tracing::warn;

use crate::config::ServerConfig;
use crate::self_metrics::{RssProbe, SelfMetrics};

pub type SharedState = Arc<ServerState>;

pub struct ServerState {
    pub collector: Arc<Collector>,
    pub stats: SelfMetrics,
    pub max_message_size: usize,
    render_ctx: RenderContext,
    render_timeout: Duration,
    rss: RssProbe,
}

impl ServerState {
    pub fn new(config: &ServerConfig, collector: Arc<Collector>) -> Self {
        Self {
            collector,
            stats: SelfMetrics::new(),
            max_message_size: config.max_message_size,
            render_ctx: config.render_context(),
            render_timeout: config.render_timeout(),
            rss: RssProbe::new(),
        }
    }

    pub fn render_context(&self) -> &RenderContext {
        &self.render_ctx
    }

    /// The full exposition: self-metrics first, then everything the
    /// collector holds.
    ///
    /// If the collector does not finish within the render timeout only the
    /// self-metrics are returned, with `collector_working` at 0.
    pub async fn render_metrics(&self) -> String {
        let collected =
            match tokio::time::timeout(self.render_timeout, self.collector.render(&self.render_ctx))
                .await
            {
                Ok(text) => Some(text),
                Err(_) => {
                    warn!(
                        timeout_ms = self.render_timeout.as_millis() as u64,
                        "collector render timed out"
                    );
                    None
                }
            };

        let working = collected.as_ref().is_some_and(|text| !text.is_empty());
        let rss_bytes = self.rss.sample().await;
        let mut out = render_all(
            &self.stats.snapshot(working, rss_bytes),
            &self.render_ctx,
        );
        if let Some(text) = collected.filter(|text| !text.is_empty()) {
            out.push('\n');
            out.push_str(&text);
        }
        out
    }
}
