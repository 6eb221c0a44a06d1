//! The ad-hoc metric message carried inside a frame.
//!
//! Type-routed messages (those whose `type` names a registered collector)
//! are free-form JSON objects and are not modelled here; this is the shape
//! of a message that observes a named metric directly.

use serde::{Deserialize, Deserializer, Serialize};
use statrelay_metrics::{LabelSet, MetricKind};

/// What to do with `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Increment,
    Decrement,
}

/// Creation-time options for histograms and summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantiles: Option<Vec<f64>>,
}

/// An observation of a named metric.
///
/// The absence of `prometheus_exporter_action` means "observe", and so does
/// any value other than `increment` or `decrement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMessage {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub help: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<LabelSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_labels: Option<LabelSet>,
    #[serde(
        default,
        rename = "prometheus_exporter_action",
        deserialize_with = "lenient_action",
        skip_serializing_if = "Option::is_none"
    )]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<MetricOptions>,
}

impl MetricMessage {
    pub fn new(
        kind: MetricKind,
        name: impl Into<String>,
        help: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            help: help.into(),
            value: Some(value),
            keys: None,
            custom_labels: None,
            action: None,
            opts: None,
        }
    }

    pub fn with_keys(mut self, keys: LabelSet) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_custom_labels(mut self, labels: LabelSet) -> Self {
        self.custom_labels = Some(labels);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_opts(mut self, opts: MetricOptions) -> Self {
        self.opts = Some(opts);
        self
    }

    /// The label set this observation applies to: `keys` as the base with
    /// `custom_labels` merged over it (custom labels win on conflict).
    pub fn label_set(&self) -> LabelSet {
        match (&self.keys, &self.custom_labels) {
            (Some(keys), Some(custom)) => keys.merged_with(custom),
            (Some(keys), None) => keys.clone(),
            (None, Some(custom)) => custom.clone(),
            (None, None) => LabelSet::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn lenient_action<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Action>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw.as_ref().and_then(serde_json::Value::as_str) {
        Some("increment") => Some(Action::Increment),
        Some("decrement") => Some(Action::Decrement),
        _ => None,
    })
}
