//! Client-side handles for a single named metric.

use statrelay_metrics::{LabelSet, MetricKind};
use statrelay_protocol::{Action, MetricMessage, MetricOptions};

use crate::client::Client;
use crate::error::ClientResult;

/// Builds and queues ad-hoc messages for one metric.
///
/// The collector creates the metric on the first message it sees, so the
/// handle itself holds no state beyond the metric's identity.
#[derive(Clone)]
pub struct RemoteMetric {
    client: Client,
    kind: MetricKind,
    name: String,
    help: String,
    opts: Option<MetricOptions>,
}

impl RemoteMetric {
    pub(crate) fn new(client: Client, kind: MetricKind, name: String, help: String) -> Self {
        Self {
            client,
            kind,
            name,
            help,
            opts: None,
        }
    }

    /// Bucket or quantile options sent with every message.
    pub fn with_opts(mut self, opts: MetricOptions) -> Self {
        self.opts = Some(opts);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn observe(&self, value: f64, keys: &LabelSet) -> ClientResult<()> {
        self.client.send(&self.message(value, keys))
    }

    pub fn increment(&self, by: f64, keys: &LabelSet) -> ClientResult<()> {
        self.client
            .send(&self.message(by, keys).with_action(Action::Increment))
    }

    pub fn decrement(&self, by: f64, keys: &LabelSet) -> ClientResult<()> {
        self.client
            .send(&self.message(by, keys).with_action(Action::Decrement))
    }

    fn message(&self, value: f64, keys: &LabelSet) -> MetricMessage {
        let mut message = MetricMessage::new(self.kind, &self.name, &self.help, value);
        if !keys.is_empty() {
            message = message.with_keys(keys.clone());
        }
        if let Some(opts) = &self.opts {
            message = message.with_opts(opts.clone());
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[test]
    fn increment_builds_action_message() {
        let client = Client::detached(ClientConfig::default());
        let requests = client.register(MetricKind::Counter, "requests_total", "Requests");
        requests
            .increment(1.0, &LabelSet::new().with("route", "/"))
            .unwrap();
        requests.observe(2.0, &LabelSet::new()).unwrap();
        assert_eq!(client.queue_len(), 2);
    }

    #[test]
    fn message_carries_identity_and_opts() {
        let client = Client::detached(ClientConfig::default());
        let latency = client
            .register(MetricKind::Histogram, "latency_seconds", "Latency")
            .with_opts(MetricOptions {
                buckets: Some(vec![0.1, 1.0]),
                quantiles: None,
            });
        let message = latency.message(0.3, &LabelSet::new());
        assert_eq!(message.kind, MetricKind::Histogram);
        assert_eq!(message.name, "latency_seconds");
        assert_eq!(message.keys, None);
        assert_eq!(message.opts.unwrap().buckets, Some(vec![0.1, 1.0]));
    }
}
