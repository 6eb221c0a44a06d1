//! Prometheus text exposition format.
//!
//! Every primitive renders through [`RenderContext`], which carries the
//! name prefix and the default labels merged into every label set. The
//! context is built once at startup and passed by reference into each
//! render call.

use std::fmt::Write;

use crate::labels::{escape_label_value, LabelSet};
use crate::metric::MetricKind;

/// Rendering parameters shared by every metric in one exposition.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    prefix: String,
    default_labels: LabelSet,
}

impl RenderContext {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            default_labels: LabelSet::new(),
        }
    }

    /// Labels merged into every rendered label set. Explicit labels win.
    pub fn with_default_labels(mut self, labels: LabelSet) -> Self {
        self.default_labels = labels;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_labels(&self) -> &LabelSet {
        &self.default_labels
    }

    /// The exposed metric name.
    pub fn metric_name(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Write the `# HELP` / `# TYPE` header of a metric.
    pub(crate) fn write_header(&self, out: &mut String, name: &str, help: &str, kind: MetricKind) {
        let _ = writeln!(out, "# HELP {}{name} {}", self.prefix, escape_help(help));
        let _ = writeln!(out, "# TYPE {}{name} {}", self.prefix, kind.as_str());
    }

    /// Write one sample line: `<prefix><name><suffix>{labels} <value>`.
    ///
    /// `extra` is appended after the (sorted) merged labels; histograms
    /// use it for `le` and summaries for `quantile`.
    pub(crate) fn write_sample(
        &self,
        out: &mut String,
        name: &str,
        suffix: &str,
        labels: &LabelSet,
        extra: Option<(&str, &str)>,
        value: f64,
    ) {
        let _ = write!(out, "{}{name}{suffix}", self.prefix);

        let merged;
        let labels = if self.default_labels.is_empty() {
            labels
        } else {
            merged = self.default_labels.merged_with(labels);
            &merged
        };

        if !labels.is_empty() || extra.is_some() {
            out.push('{');
            let mut first = true;
            for (k, v) in labels.iter() {
                if !first {
                    out.push(',');
                }
                first = false;
                let _ = write!(out, "{k}=\"{}\"", escape_label_value(v));
            }
            if let Some((k, v)) = extra {
                if !first {
                    out.push(',');
                }
                let _ = write!(out, "{k}=\"{}\"", escape_label_value(v));
            }
            out.push('}');
        }

        let _ = writeln!(out, " {}", format_value(value));
    }
}

/// Format a sample value the way Prometheus parsers expect.
///
/// Integral values print without a fractional part (`5`, not `5.0`);
/// infinities print as `+Inf`/`-Inf`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
