//! The producer-side handle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use statrelay_metrics::{LabelSet, MetricKind};
use statrelay_protocol::{frame, MetricMessage};
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::remote::RemoteMetric;
use crate::worker::{Shared, WorkerHandle};

/// Minimum time a stopping worker gets for its final pass.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// A cheap-to-clone handle that queues metric messages for delivery to a
/// collector.
///
/// Sending never blocks on the network and never fails because the
/// collector is unreachable: messages are framed, queued (bounded, oldest
/// dropped first) and written by a single background worker. The worker is
/// started on first send and restarted if it has died or the process has
/// forked.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
    autostart: bool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.signal_stop();
        }
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::build(config, true)
    }

    /// A client whose worker never starts, so queued frames stay put.
    #[cfg(test)]
    pub(crate) fn detached(config: ClientConfig) -> Self {
        Self::build(config, false)
    }

    fn build(config: ClientConfig, autostart: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    config,
                    queue: Mutex::new(VecDeque::new()),
                }),
                worker: Mutex::new(None),
                autostart,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.shared.config
    }

    /// Handle for repeatedly observing one named metric.
    pub fn register(
        &self,
        kind: MetricKind,
        name: impl Into<String>,
        help: impl Into<String>,
    ) -> RemoteMetric {
        RemoteMetric::new(self.clone(), kind, name.into(), help.into())
    }

    pub fn send(&self, message: &MetricMessage) -> ClientResult<()> {
        self.send_json(serde_json::to_value(message)?)
    }

    /// Queue an arbitrary JSON message. Client-level custom labels are
    /// merged into the `custom_labels` of object messages.
    pub fn send_json(&self, mut message: Value) -> ClientResult<()> {
        if let Some(labels) = &self.inner.shared.config.custom_labels {
            apply_custom_labels(&mut message, labels);
        }
        let payload = serde_json::to_vec(&message)?;
        self.send_raw(payload);
        Ok(())
    }

    /// Queue an already-serialized message as one frame.
    pub fn send_raw(&self, payload: impl AsRef<[u8]>) {
        self.enqueue(frame(payload.as_ref()));
    }

    fn enqueue(&self, frame: Bytes) {
        let max = self.inner.shared.config.max_queue_size;
        let dropped = {
            let mut queue = self.inner.shared.queue.lock();
            queue.push_back(frame);
            let mut dropped = 0usize;
            while queue.len() > max {
                queue.pop_front();
                dropped += 1;
            }
            dropped
        };
        if dropped > 0 {
            warn!(max_queue_size = max, dropped, "metric queue full, dropping oldest");
        }
        self.ensure_worker();
    }

    fn ensure_worker(&self) {
        if !self.inner.autostart {
            return;
        }
        let mut worker = self.inner.worker.lock();
        if worker.as_ref().is_some_and(WorkerHandle::is_alive) {
            return;
        }
        match WorkerHandle::spawn(self.inner.shared.clone()) {
            Ok(handle) => {
                if let Some(old) = worker.replace(handle) {
                    debug!("replacing dead delivery worker");
                    old.signal_stop();
                }
            }
            Err(err) => error!(error = %err, "metrics will queue without delivery"),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inner.shared.queue.lock().len()
    }

    pub fn is_worker_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .is_some_and(WorkerHandle::is_alive)
    }

    /// Wait up to `timeout` for the queue to drain, then stop the worker,
    /// which terminates and closes its connection.
    ///
    /// Blocks the calling thread for at most `timeout` plus a short grace
    /// period. Messages still queued afterwards are kept and delivered if
    /// the client is used again.
    pub fn shutdown(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.queue_len() > 0 && self.is_worker_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            let grace = deadline.saturating_duration_since(Instant::now()).max(STOP_GRACE);
            worker.stop(grace);
        }
        debug!(remaining = self.queue_len(), "client shut down");
    }
}

fn apply_custom_labels(message: &mut Value, client_labels: &LabelSet) {
    let Value::Object(object) = message else {
        return;
    };
    let entry = object
        .entry("custom_labels")
        .or_insert_with(|| Value::Object(Default::default()));
    if entry.is_null() {
        *entry = Value::Object(Default::default());
    }
    let Value::Object(labels) = entry else {
        return;
    };
    for (key, value) in client_labels.iter() {
        labels
            .entry(key.to_string())
            .or_insert_with(|| Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use serde_json::json;
    use statrelay_protocol::{ChunkDecoder, Decoded};

    fn queued_payloads(client: &Client) -> Vec<Value> {
        let queue = client.inner.shared.queue.lock();
        queue
            .iter()
            .map(|frame| {
                let mut buf = BytesMut::from(&frame[..]);
                match ChunkDecoder::default().decode(&mut buf).unwrap() {
                    Some(Decoded::Message(payload)) => serde_json::from_slice(&payload).unwrap(),
                    other => panic!("unexpected decode result: {other:?}"),
                }
            })
            .collect()
    }

    #[test]
    fn overflow_keeps_newest_messages() {
        let client = Client::detached(ClientConfig::default().with_max_queue_size(3));
        for i in 0..5 {
            client.send_json(json!({"seq": i})).unwrap();
        }
        assert_eq!(client.queue_len(), 3);
        let seqs: Vec<i64> = queued_payloads(&client)
            .iter()
            .map(|v| v["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn each_message_is_one_frame() {
        let client = Client::detached(ClientConfig::default());
        let message = MetricMessage::new(MetricKind::Gauge, "widgets", "Widgets", 5.0)
            .with_keys(LabelSet::new().with("color", "red"));
        client.send(&message).unwrap();

        let payloads = queued_payloads(&client);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["name"], "widgets");
        assert_eq!(payloads[0]["keys"]["color"], "red");
    }

    #[test]
    fn message_labels_win_over_client_labels() {
        let config = ClientConfig::default()
            .with_custom_labels(LabelSet::new().with("env", "prod").with("host", "a"));
        let client = Client::detached(config);
        client
            .send_json(json!({"type": "counter", "custom_labels": {"host": "b"}}))
            .unwrap();
        client.send_json(json!({"type": "counter"})).unwrap();

        let payloads = queued_payloads(&client);
        assert_eq!(payloads[0]["custom_labels"], json!({"env": "prod", "host": "b"}));
        assert_eq!(payloads[1]["custom_labels"], json!({"env": "prod", "host": "a"}));
    }

    #[test]
    fn non_object_messages_pass_through() {
        let config = ClientConfig::default().with_custom_labels(LabelSet::new().with("a", "1"));
        let client = Client::detached(config);
        client.send_json(json!([1, 2])).unwrap();
        assert_eq!(queued_payloads(&client), vec![json!([1, 2])]);
    }

    #[test]
    fn detached_client_has_no_worker() {
        let client = Client::detached(ClientConfig::default());
        client.send_raw(b"{}");
        assert!(!client.is_worker_running());
    }
}
