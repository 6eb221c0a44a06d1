//! Message dispatch and the ad-hoc metric registry.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde_json::Value;
use statrelay_metrics::{
    render_all, Counter, Gauge, Histogram, LabelSet, Metric, MetricKind, RenderContext, Summary,
    DEFAULT_BUCKETS,
};
use statrelay_protocol::{Action, MetricMessage};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CollectorError, CollectorResult};

/// A collector that owns every message whose `type` equals its
/// [`type_name`](TypeCollector::type_name).
///
/// `collect` folds one message into the collector's state; `metrics`
/// produces the current primitives to render. Both are called with the
/// registry lock held, so implementations never see concurrent calls.
pub trait TypeCollector: Send {
    fn type_name(&self) -> &str;

    fn collect(&mut self, message: &Value) -> CollectorResult<()>;

    fn metrics(&mut self) -> Vec<Metric>;
}

struct Registry {
    type_collectors: BTreeMap<String, Box<dyn TypeCollector>>,
    metrics: BTreeMap<String, Metric>,
    default_buckets: Vec<f64>,
}

/// Routes decoded messages to type collectors or the ad-hoc registry and
/// renders everything it holds.
///
/// Processing and rendering are serialized on one async mutex, so a scrape
/// never observes a half-applied message.
pub struct Collector {
    registry: Mutex<Registry>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                type_collectors: BTreeMap::new(),
                metrics: BTreeMap::new(),
                default_buckets: DEFAULT_BUCKETS.to_vec(),
            }),
        }
    }

    /// Buckets for histograms created without explicit `opts.buckets`.
    pub fn with_default_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.registry.get_mut().default_buckets = buckets;
        self
    }

    pub fn with_collector(mut self, collector: impl TypeCollector + 'static) -> Self {
        self.register(collector);
        self
    }

    /// Register a type collector, replacing any previous one for the same type.
    pub fn register(&mut self, collector: impl TypeCollector + 'static) {
        let name = collector.type_name().to_string();
        debug!(type_name = %name, "registering type collector");
        self.registry
            .get_mut()
            .type_collectors
            .insert(name, Box::new(collector));
    }

    /// Decode and apply one raw message.
    pub async fn process(&self, raw: &[u8]) -> CollectorResult<()> {
        let value: Value = serde_json::from_slice(raw).map_err(CollectorError::Decode)?;
        self.process_value(&value).await
    }

    /// Apply one decoded message.
    ///
    /// Messages for unknown kinds, or missing a required field, are logged
    /// and dropped rather than reported as failures.
    pub async fn process_value(&self, value: &Value) -> CollectorResult<()> {
        let Value::Object(object) = value else {
            return Err(CollectorError::NotAnObject);
        };

        let mut registry = self.registry.lock().await;
        if let Some(type_name) = object.get("type").and_then(Value::as_str) {
            if let Some(collector) = registry.type_collectors.get_mut(type_name) {
                return collector.collect(value).map_err(|err| match err {
                    CollectorError::Aggregator { .. } => err,
                    other => CollectorError::Aggregator {
                        type_name: type_name.to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        }

        match registry.apply_adhoc(value) {
            Err(err) if err.is_ignorable() => {
                warn!(error = %err, "dropping metric message");
                Ok(())
            }
            result => result,
        }
    }

    /// Render ad-hoc metrics followed by each type collector's metrics.
    pub async fn render(&self, ctx: &RenderContext) -> String {
        let mut registry = self.registry.lock().await;
        let typed: Vec<Metric> = registry
            .type_collectors
            .values_mut()
            .flat_map(|collector| collector.metrics())
            .collect();
        render_all(registry.metrics.values().chain(&typed), ctx)
    }

    /// Run `f` against the ad-hoc metric called `name`.
    pub async fn with_metric<R>(&self, name: &str, f: impl FnOnce(&Metric) -> R) -> Option<R> {
        let registry = self.registry.lock().await;
        registry.metrics.get(name).map(f)
    }

    pub async fn metric_names(&self) -> Vec<String> {
        self.registry.lock().await.metrics.keys().cloned().collect()
    }

    /// Forget an ad-hoc metric entirely.
    pub async fn remove_metric(&self, name: &str) -> bool {
        self.registry.lock().await.metrics.remove(name).is_some()
    }

    pub async fn type_names(&self) -> Vec<String> {
        self.registry
            .lock()
            .await
            .type_collectors
            .keys()
            .cloned()
            .collect()
    }
}

impl Registry {
    fn apply_adhoc(&mut self, value: &Value) -> CollectorResult<()> {
        for field in ["name", "help", "type"] {
            if value.get(field).is_none_or(Value::is_null) {
                return Err(CollectorError::MissingField(field));
            }
        }
        let kind_name = value["type"]
            .as_str()
            .ok_or_else(|| CollectorError::InvalidValue("\"type\" must be a string".into()))?;
        if let Err(unknown) = kind_name.parse::<MetricKind>() {
            return Err(CollectorError::UnknownKind(unknown.0));
        }

        let message: MetricMessage = serde_json::from_value(value.clone())
            .map_err(|err| CollectorError::InvalidValue(err.to_string()))?;
        let labels = message.label_set();
        if message.action.is_none() {
            if let Some(action) = value.get("prometheus_exporter_action").filter(|a| !a.is_null()) {
                debug!(name = %message.name, %action, "unrecognised action, observing");
            }
        }

        let metric = match self.metrics.entry(message.name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(name = %message.name, kind = %message.kind, "creating metric");
                entry.insert(create_metric(&message, &self.default_buckets))
            }
        };
        apply(metric, &message, &labels)
    }
}

fn create_metric(message: &MetricMessage, default_buckets: &[f64]) -> Metric {
    let name = message.name.as_str();
    let help = message.help.as_str();
    let opts = message.opts.as_ref();
    match message.kind {
        MetricKind::Counter => Counter::new(name, help).into(),
        MetricKind::Gauge => Gauge::new(name, help).into(),
        MetricKind::Histogram => {
            let buckets = opts
                .and_then(|o| o.buckets.clone())
                .unwrap_or_else(|| default_buckets.to_vec());
            Histogram::with_buckets(name, help, buckets).into()
        }
        MetricKind::Summary => match opts.and_then(|o| o.quantiles.clone()) {
            Some(quantiles) => Summary::with_quantiles(name, help, quantiles).into(),
            None => Summary::new(name, help).into(),
        },
    }
}

/// Apply one observation. The existing metric's kind wins over the kind
/// named in the message.
fn apply(metric: &mut Metric, message: &MetricMessage, labels: &LabelSet) -> CollectorResult<()> {
    let kind = metric.kind();
    let delta = message.value.unwrap_or(1.0);
    match (metric, message.action) {
        (Metric::Counter(c), None) => c.observe(labels, delta),
        (Metric::Counter(c), Some(Action::Increment)) => c.increment(labels, delta),
        (Metric::Counter(c), Some(Action::Decrement)) => c.decrement(labels, delta),
        (Metric::Gauge(g), None) => match message.value {
            Some(v) => g.observe(labels, v),
            None => {
                g.remove(labels);
            }
        },
        (Metric::Gauge(g), Some(Action::Increment)) => g.increment(labels, delta),
        (Metric::Gauge(g), Some(Action::Decrement)) => g.decrement(labels, delta),
        (Metric::Histogram(h), None) => h.observe(labels, required_value(message)?),
        (Metric::Summary(s), None) => s.observe(labels, required_value(message)?),
        (_, Some(action)) => return Err(CollectorError::UnsupportedAction { kind, action }),
    }
    Ok(())
}

fn required_value(message: &MetricMessage) -> CollectorResult<f64> {
    message
        .value
        .ok_or(CollectorError::MissingField("value"))
}
