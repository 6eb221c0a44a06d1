//! Per-request web observations.

use serde::Deserialize;
use serde_json::Value;
use statrelay_metrics::{Counter, LabelSet, Metric, Summary};

use crate::dispatch::TypeCollector;
use crate::error::{CollectorError, CollectorResult};

pub const TYPE_NAME: &str = "web";

#[derive(Debug, Deserialize)]
struct Timings {
    total_duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WebRequest {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    timings: Option<Timings>,
    #[serde(default)]
    default_labels: Option<LabelSet>,
    #[serde(default)]
    custom_labels: Option<LabelSet>,
}

#[derive(Debug)]
pub struct WebCollector {
    requests: Counter,
    durations: Summary,
}

impl Default for WebCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebCollector {
    pub fn new() -> Self {
        Self {
            requests: Counter::new(
                "http_requests_total",
                "Total HTTP requests from web app.",
            ),
            durations: Summary::new(
                "http_request_duration_seconds",
                "Time spent in HTTP reqs in seconds.",
            ),
        }
    }
}

impl TypeCollector for WebCollector {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn collect(&mut self, message: &Value) -> CollectorResult<()> {
        let request = WebRequest::deserialize(message)
            .map_err(|err| CollectorError::InvalidValue(err.to_string()))?;

        let base = request.default_labels.unwrap_or_default();
        let labels = match &request.custom_labels {
            Some(custom) => base.merged_with(custom),
            None => base,
        };

        let status = match request.status {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => "unknown".to_string(),
            Some(other) => other.to_string(),
        };
        self.requests
            .observe(&labels.clone().with("status", status), 1.0);

        if let Some(duration) = request.timings.and_then(|t| t.total_duration) {
            self.durations.observe(&labels, duration);
        }
        Ok(())
    }

    fn metrics(&mut self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        if self.requests.series_count() > 0 {
            metrics.push(self.requests.clone().into());
        }
        if self.durations.series_count() > 0 {
            metrics.push(self.durations.clone().into());
        }
        metrics
    }
}
