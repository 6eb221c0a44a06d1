//! Cumulative-bucket histogram.

use std::collections::BTreeMap;

use crate::exposition::{format_value, RenderContext};
use crate::labels::LabelSet;

/// Bucket boundaries used when none are configured.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Per-label-set histogram state.
#[derive(Debug, Clone)]
struct Series {
    /// Cumulative count per boundary, parallel to `Histogram::buckets`.
    buckets: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Series {
    fn new(bucket_count: usize) -> Self {
        Self {
            buckets: vec![0; bucket_count],
            count: 0,
            sum: 0.0,
        }
    }
}

/// A histogram with fixed ascending boundaries shared by all label sets.
#[derive(Debug, Clone)]
pub struct Histogram {
    name: String,
    help: String,
    buckets: Vec<f64>,
    series: BTreeMap<LabelSet, Series>,
}

impl Histogram {
    /// Create a histogram with [`DEFAULT_BUCKETS`].
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::with_buckets(name, help, DEFAULT_BUCKETS)
    }

    /// Create a histogram with custom boundaries.
    ///
    /// Boundaries are sorted ascending and deduplicated; NaN and infinite
    /// boundaries are discarded (`+Inf` is always rendered implicitly).
    pub fn with_buckets(
        name: impl Into<String>,
        help: impl Into<String>,
        buckets: impl IntoIterator<Item = f64>,
    ) -> Self {
        let mut buckets: Vec<f64> = buckets.into_iter().filter(|b| b.is_finite()).collect();
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();
        Self {
            name: name.into(),
            help: help.into(),
            buckets,
            series: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Record `value`: bumps count and sum, and every bucket whose
    /// boundary is `>= value`.
    pub fn observe(&mut self, labels: &LabelSet, value: f64) {
        let bucket_count = self.buckets.len();
        let series = self
            .series
            .entry(labels.clone())
            .or_insert_with(|| Series::new(bucket_count));

        series.count += 1;
        series.sum += value;
        for (i, boundary) in self.buckets.iter().enumerate().rev() {
            if value > *boundary {
                break;
            }
            series.buckets[i] += 1;
        }
    }

    /// Drop the series for `labels`.
    pub fn remove(&mut self, labels: &LabelSet) -> bool {
        self.series.remove(labels).is_some()
    }

    pub fn count(&self, labels: &LabelSet) -> Option<u64> {
        self.series.get(labels).map(|s| s.count)
    }

    pub fn sum(&self, labels: &LabelSet) -> Option<f64> {
        self.series.get(labels).map(|s| s.sum)
    }

    /// Cumulative count at `boundary`, if it is one of the configured buckets.
    pub fn bucket_count(&self, labels: &LabelSet, boundary: f64) -> Option<u64> {
        let idx = self.buckets.iter().position(|b| *b == boundary)?;
        self.series.get(labels).map(|s| s.buckets[idx])
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub(crate) fn render_samples(&self, ctx: &RenderContext, out: &mut String) {
        for (labels, series) in &self.series {
            for (boundary, count) in self.buckets.iter().zip(&series.buckets) {
                let le = format_value(*boundary);
                ctx.write_sample(out, &self.name, "_bucket", labels, Some(("le", &le)), *count as f64);
            }
            ctx.write_sample(
                out,
                &self.name,
                "_bucket",
                labels,
                Some(("le", "+Inf")),
                series.count as f64,
            );
            ctx.write_sample(out, &self.name, "_count", labels, None, series.count as f64);
            ctx.write_sample(out, &self.name, "_sum", labels, None, series.sum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn buckets_sorted_and_deduplicated() {
        let h = Histogram::with_buckets("h", "h", [1.0, 0.1, 1.0, f64::NAN, 0.5]);
        assert_eq!(h.buckets(), &[0.1, 0.5, 1.0]);
    }

    #[test]
    fn value_lands_in_every_bucket_it_does_not_exceed() {
        let mut h = Histogram::with_buckets("latency", "Latency", [0.1, 0.5, 1.0]);
        let labels = LabelSet::new();
        h.observe(&labels, 0.5);
        assert_eq!(h.bucket_count(&labels, 0.1), Some(0));
        assert_eq!(h.bucket_count(&labels, 0.5), Some(1));
        assert_eq!(h.bucket_count(&labels, 1.0), Some(1));
        assert_eq!(h.count(&labels), Some(1));
        assert_eq!(h.sum(&labels), Some(0.5));
    }

    #[test]
    fn value_above_all_buckets_only_counts() {
        let mut h = Histogram::with_buckets("h", "h", [1.0]);
        let labels = LabelSet::new();
        h.observe(&labels, 20.0);
        assert_eq!(h.bucket_count(&labels, 1.0), Some(0));
        assert_eq!(h.count(&labels), Some(1));
    }

    #[test]
    fn render_layout() {
        let mut h = Histogram::with_buckets("req", "Requests", [0.5, 1.0]);
        let labels = LabelSet::new().with("route", "/");
        h.observe(&labels, 0.25);
        h.observe(&labels, 0.75);

        let mut out = String::new();
        h.render_samples(&RenderContext::default(), &mut out);
        assert_eq!(
            out,
            "req_bucket{route=\"/\",le=\"0.5\"} 1\n\
             req_bucket{route=\"/\",le=\"1\"} 2\n\
             req_bucket{route=\"/\",le=\"+Inf\"} 2\n\
             req_count{route=\"/\"} 2\n\
             req_sum{route=\"/\"} 1\n"
        );
    }

    #[test]
    fn remove_drops_series() {
        let mut h = Histogram::new("h", "h");
        let labels = LabelSet::new().with("a", "1");
        h.observe(&labels, 1.0);
        assert!(h.remove(&labels));
        assert_eq!(h.count(&labels), None);
        assert_eq!(h.series_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_buckets_are_cumulative(values in proptest::collection::vec(0.0f64..20.0, 1..200)) {
            let mut h = Histogram::new("h", "h");
            let labels = LabelSet::new();
            for v in &values {
                h.observe(&labels, *v);
            }
            let counts: Vec<u64> = h
                .buckets()
                .iter()
                .map(|b| h.bucket_count(&labels, *b).unwrap())
                .collect();
            for pair in counts.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            prop_assert_eq!(h.count(&labels), Some(values.len() as u64));
            for (boundary, count) in h.buckets().iter().zip(&counts) {
                let expected = values.iter().filter(|v| **v <= *boundary).count() as u64;
                prop_assert_eq!(*count, expected);
            }
        }
    }
}
