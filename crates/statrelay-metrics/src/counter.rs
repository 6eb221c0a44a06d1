//! Monotonic-by-convention accumulator.

use std::collections::BTreeMap;

use crate::exposition::RenderContext;
use crate::labels::LabelSet;

/// A counter: one accumulated value per label set, starting at 0.
#[derive(Debug, Clone)]
pub struct Counter {
    name: String,
    help: String,
    data: BTreeMap<LabelSet, f64>,
}

impl Counter {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Add `delta` to the series for `labels`.
    pub fn observe(&mut self, labels: &LabelSet, delta: f64) {
        *self.data.entry(labels.clone()).or_insert(0.0) += delta;
    }

    pub fn increment(&mut self, labels: &LabelSet, delta: f64) {
        self.observe(labels, delta);
    }

    pub fn decrement(&mut self, labels: &LabelSet, delta: f64) {
        self.observe(labels, -delta);
    }

    /// Set the series for `labels` back to 0.
    pub fn reset(&mut self, labels: &LabelSet) {
        self.data.insert(labels.clone(), 0.0);
    }

    pub fn remove(&mut self, labels: &LabelSet) -> bool {
        self.data.remove(labels).is_some()
    }

    pub fn value(&self, labels: &LabelSet) -> Option<f64> {
        self.data.get(labels).copied()
    }

    pub fn series_count(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn render_samples(&self, ctx: &RenderContext, out: &mut String) {
        for (labels, value) in &self.data {
            ctx.write_sample(out, &self.name, "", labels, None, *value);
        }
    }
}
