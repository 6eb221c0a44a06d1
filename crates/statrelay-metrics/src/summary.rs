//! Windowed quantile summary.
//!
//! Each label set keeps two raw-sample buffers that both receive every
//! observation. Every [`ROTATE_AGE`] the active buffer is cleared and the
//! other one (holding up to one full window of history) becomes active, so
//! quantiles cover roughly the last rotation period with bounded memory.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::exposition::{format_value, RenderContext};
use crate::labels::LabelSet;

pub const DEFAULT_QUANTILES: [f64; 5] = [0.99, 0.9, 0.5, 0.1, 0.01];

/// How long a sample buffer stays active before rotation.
pub const ROTATE_AGE: Duration = Duration::from_secs(120);

type Buffer = BTreeMap<LabelSet, Vec<f64>>;

#[derive(Debug, Clone)]
pub struct Summary {
    name: String,
    help: String,
    quantiles: Vec<f64>,
    buffers: [Buffer; 2],
    current: usize,
    last_rotated: Instant,
    counts: BTreeMap<LabelSet, u64>,
    sums: BTreeMap<LabelSet, f64>,
}

impl Summary {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::with_quantiles(name, help, DEFAULT_QUANTILES)
    }

    /// Quantiles outside `[0, 1]` are discarded.
    pub fn with_quantiles(
        name: impl Into<String>,
        help: impl Into<String>,
        quantiles: impl IntoIterator<Item = f64>,
    ) -> Self {
        Self::starting_at(name, help, quantiles, Instant::now())
    }

    fn starting_at(
        name: impl Into<String>,
        help: impl Into<String>,
        quantiles: impl IntoIterator<Item = f64>,
        now: Instant,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            quantiles: quantiles
                .into_iter()
                .filter(|q| (0.0..=1.0).contains(q))
                .collect(),
            buffers: [Buffer::new(), Buffer::new()],
            current: 0,
            last_rotated: now,
            counts: BTreeMap::new(),
            sums: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn quantile_levels(&self) -> &[f64] {
        &self.quantiles
    }

    pub fn observe(&mut self, labels: &LabelSet, value: f64) {
        self.observe_at(labels, value, Instant::now());
    }

    pub fn observe_at(&mut self, labels: &LabelSet, value: f64, now: Instant) {
        self.rotate_if_due(now);
        for buffer in &mut self.buffers {
            buffer.entry(labels.clone()).or_default().push(value);
        }
        *self.counts.entry(labels.clone()).or_insert(0) += 1;
        *self.sums.entry(labels.clone()).or_insert(0.0) += value;
    }

    pub fn count(&self, labels: &LabelSet) -> Option<u64> {
        self.counts.get(labels).copied()
    }

    pub fn sum(&self, labels: &LabelSet) -> Option<f64> {
        self.sums.get(labels).copied()
    }

    pub fn series_count(&self) -> usize {
        self.counts.len()
    }

    /// Quantile estimates for `labels` as `(level, value)` pairs, or an
    /// empty vec when the active window holds no samples.
    pub fn quantiles(&self, labels: &LabelSet) -> Vec<(f64, f64)> {
        self.quantiles_at(labels, Instant::now())
    }

    pub fn quantiles_at(&self, labels: &LabelSet, now: Instant) -> Vec<(f64, f64)> {
        let Some(samples) = self.active_buffer(now).get(labels) else {
            return Vec::new();
        };
        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);
        self.quantiles
            .iter()
            .filter_map(|q| nearest_rank(&sorted, *q).map(|v| (*q, v)))
            .collect()
    }

    fn rotate_if_due(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_rotated) > ROTATE_AGE {
            self.last_rotated = now;
            self.buffers[self.current].clear();
            self.current = (self.current + 1) % 2;
        }
    }

    /// The buffer quantiles are read from at `now`. When a rotation is due
    /// but no observation has triggered it yet, the buffer that would
    /// become active is used, which keeps rendering read-only.
    fn active_buffer(&self, now: Instant) -> &Buffer {
        if now.saturating_duration_since(self.last_rotated) > ROTATE_AGE {
            &self.buffers[(self.current + 1) % 2]
        } else {
            &self.buffers[self.current]
        }
    }

    pub(crate) fn render_samples(&self, ctx: &RenderContext, out: &mut String) {
        let now = Instant::now();
        for (labels, count) in &self.counts {
            for (level, value) in self.quantiles_at(labels, now) {
                let level = format_value(level);
                ctx.write_sample(out, &self.name, "", labels, Some(("quantile", &level)), value);
            }
            let sum = self.sums.get(labels).copied().unwrap_or(0.0);
            ctx.write_sample(out, &self.name, "_sum", labels, None, sum);
            ctx.write_sample(out, &self.name, "_count", labels, None, *count as f64);
        }
    }
}

/// Nearest-rank quantile over sorted samples: the element at
/// `ceil(n * q) - 1`, clamped to the valid range.
pub fn nearest_rank(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() as f64 * q).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[idx])
}
