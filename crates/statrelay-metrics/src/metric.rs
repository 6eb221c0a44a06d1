//! The closed set of metric kinds and the tagged union over them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::counter::Counter;
use crate::exposition::RenderContext;
use crate::gauge::Gauge;
use crate::histogram::Histogram;
use crate::summary::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`MetricKind::from_str`] for names outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMetricKind(pub String);

impl fmt::Display for UnknownMetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown metric kind: {}", self.0)
    }
}

impl std::error::Error for UnknownMetricKind {}

impl FromStr for MetricKind {
    type Err = UnknownMetricKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            "summary" => Ok(MetricKind::Summary),
            other => Err(UnknownMetricKind(other.to_string())),
        }
    }
}

/// A metric of any kind.
///
/// Kind-specific operations are reached by matching on the variant.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
    Summary(Summary),
}

impl Metric {
    pub fn name(&self) -> &str {
        match self {
            Metric::Counter(m) => m.name(),
            Metric::Gauge(m) => m.name(),
            Metric::Histogram(m) => m.name(),
            Metric::Summary(m) => m.name(),
        }
    }

    pub fn help(&self) -> &str {
        match self {
            Metric::Counter(m) => m.help(),
            Metric::Gauge(m) => m.help(),
            Metric::Histogram(m) => m.help(),
            Metric::Summary(m) => m.help(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Summary(_) => MetricKind::Summary,
        }
    }

    /// Append this metric's exposition block (header + samples).
    pub fn render(&self, ctx: &RenderContext, out: &mut String) {
        ctx.write_header(out, self.name(), self.help(), self.kind());
        match self {
            Metric::Counter(m) => m.render_samples(ctx, out),
            Metric::Gauge(m) => m.render_samples(ctx, out),
            Metric::Histogram(m) => m.render_samples(ctx, out),
            Metric::Summary(m) => m.render_samples(ctx, out),
        }
    }

    pub fn to_text(&self, ctx: &RenderContext) -> String {
        let mut out = String::new();
        self.render(ctx, &mut out);
        out
    }
}

impl From<Counter> for Metric {
    fn from(m: Counter) -> Self {
        Metric::Counter(m)
    }
}

impl From<Gauge> for Metric {
    fn from(m: Gauge) -> Self {
        Metric::Gauge(m)
    }
}

impl From<Histogram> for Metric {
    fn from(m: Histogram) -> Self {
        Metric::Histogram(m)
    }
}

impl From<Summary> for Metric {
    fn from(m: Summary) -> Self {
        Metric::Summary(m)
    }
}

/// Render a sequence of metrics, one block each, blocks separated by a
/// blank line.
pub fn render_all<'a>(metrics: impl IntoIterator<Item = &'a Metric>, ctx: &RenderContext) -> String {
    let mut out = String::new();
    for metric in metrics {
        if !out.is_empty() {
            out.push('\n');
        }
        metric.render(ctx, &mut out);
    }
    out
}
