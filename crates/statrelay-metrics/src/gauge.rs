//! Last-write-wins value.

use std::collections::BTreeMap;

use crate::exposition::RenderContext;
use crate::labels::LabelSet;

/// A gauge: one value per label set, replaced on every observation.
#[derive(Debug, Clone)]
pub struct Gauge {
    name: String,
    help: String,
    data: BTreeMap<LabelSet, f64>,
}

impl Gauge {
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

    pub fn observe(&mut self, labels: &LabelSet, value: f64) {
        self.data.insert(labels.clone(), value);
    }

    pub fn increment(&mut self, labels: &LabelSet, delta: f64) {
        *self.data.entry(labels.clone()).or_insert(0.0) += delta;
    }

    pub fn decrement(&mut self, labels: &LabelSet, delta: f64) {
        self.increment(labels, -delta);
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_replaces() {
        let mut g = Gauge::new("temp", "Temperature");
        let labels = LabelSet::new().with("room", "a");
        g.observe(&labels, 20.0);
        g.observe(&labels, 18.5);
        assert_eq!(g.value(&labels), Some(18.5));
    }

    #[test]
    fn increment_from_zero() {
        let mut g = Gauge::new("inflight", "In-flight requests");
        let labels = LabelSet::new();
        g.increment(&labels, 3.0);
        g.decrement(&labels, 1.0);
        assert_eq!(g.value(&labels), Some(2.0));
    }
}
