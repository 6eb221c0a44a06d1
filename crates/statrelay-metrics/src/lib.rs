//! statrelay-metrics — metric primitives and Prometheus text exposition.
//!
//! Four aggregation kinds, each mapping a [`LabelSet`] to numeric state:
//!
//! | Kind | Per label set | Operation |
//! |---|---|---|
//! | [`Counter`] | accumulator | add delta |
//! | [`Gauge`] | value | replace (last write wins) |
//! | [`Histogram`] | cumulative buckets, count, sum | bucket by boundary |
//! | [`Summary`] | two rotating sample buffers, count, sum | nearest-rank quantiles |
//!
//! [`Metric`] is the tagged union over the four. All rendering goes
//! through a [`RenderContext`] that carries the name prefix and default
//! labels; nothing here holds process-wide state.

pub mod counter;
pub mod exposition;
pub mod gauge;
pub mod histogram;
pub mod labels;
pub mod metric;
pub mod summary;

pub use counter::Counter;
pub use exposition::{format_value, RenderContext};
pub use gauge::Gauge;
pub use histogram::{Histogram, DEFAULT_BUCKETS};
pub use labels::{escape_label_value, LabelSet};
pub use metric::{render_all, Metric, MetricKind, UnknownMetricKind};
pub use summary::{Summary, DEFAULT_QUANTILES, ROTATE_AGE};
