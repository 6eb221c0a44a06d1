//! Client configuration.

use std::time::Duration;

use statrelay_metrics::LabelSet;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9394;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
pub const DEFAULT_WORKER_SLEEP: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_CONNECTION_AGE: Duration = Duration::from_secs(25);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Queued messages beyond this drop the oldest.
    pub max_queue_size: usize,
    /// Pause between delivery passes.
    pub worker_sleep: Duration,
    /// A connection older than this is finished and reopened.
    pub max_connection_age: Duration,
    pub connect_timeout: Duration,
    /// Merged into every message's `custom_labels`; per-message values win.
    pub custom_labels: Option<LabelSet>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            worker_sleep: DEFAULT_WORKER_SLEEP,
            max_connection_age: DEFAULT_MAX_CONNECTION_AGE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            custom_labels: None,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_worker_sleep(mut self, sleep: Duration) -> Self {
        self.worker_sleep = sleep;
        self
    }

    pub fn with_max_connection_age(mut self, age: Duration) -> Self {
        self.max_connection_age = age;
        self
    }

    pub fn with_custom_labels(mut self, labels: LabelSet) -> Self {
        self.custom_labels = Some(labels);
        self
    }

    pub(crate) fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9394);
        assert_eq!(config.max_queue_size, 10_000);
        assert_eq!(config.worker_sleep, Duration::from_millis(500));
        assert_eq!(config.max_connection_age, Duration::from_secs(25));
        assert_eq!(config.addr(), "localhost:9394");
    }
}
