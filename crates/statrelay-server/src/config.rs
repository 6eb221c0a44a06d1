//! Server configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use statrelay_metrics::{LabelSet, RenderContext};
use statrelay_protocol::DEFAULT_MAX_MESSAGE_SIZE;

pub const DEFAULT_PORT: u16 = 9394;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Prepended to every exposed metric name.
    pub prefix: String,
    /// Labels added to every exposed sample; explicit labels win.
    pub default_labels: LabelSet,
    /// Upper bound on collector rendering per scrape.
    pub render_timeout_ms: u64,
    /// Largest accepted message (chunk) in bytes.
    pub max_message_size: usize,
    /// Buckets for ad-hoc histograms created without `opts.buckets`.
    pub histogram_buckets: Option<Vec<f64>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            prefix: String::new(),
            default_labels: LabelSet::new(),
            render_timeout_ms: DEFAULT_RENDER_TIMEOUT_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            histogram_buckets: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext::new(self.prefix.as_str()).with_default_labels(self.default_labels.clone())
    }
}
