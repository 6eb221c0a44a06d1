//! Time-windowed snapshot storage for type collectors.
//!
//! Producers that report periodic snapshots (one per process, say) only
//! care about the latest report from each source, and a source that stops
//! reporting should disappear. [`MetricsContainer`] keeps snapshots for a
//! fixed TTL and optionally drops older snapshots superseded by a newer
//! one from the same source.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// Called as `filter(new, existing)`; returns true when `existing` is
/// superseded by `new` and should be dropped.
pub type SupersedeFilter<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

struct Entry<T> {
    value: T,
    expire_at: Instant,
}

pub struct MetricsContainer<T> {
    entries: Vec<Entry<T>>,
    ttl: Duration,
    filter: Option<SupersedeFilter<T>>,
    clock: Arc<dyn Clock>,
}

impl<T> MetricsContainer<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            ttl,
            filter: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` with `expire_at = now + ttl`.
    ///
    /// Expired entries, and entries the filter marks as superseded by
    /// `value`, are removed first.
    pub fn append(&mut self, value: T) {
        let now = self.clock.now();
        self.expire(now, Some(&value));
        self.entries.push(Entry {
            value,
            expire_at: now + self.ttl,
        });
    }

    pub fn len(&mut self) -> usize {
        self.expire_now();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn get(&mut self, index: usize) -> Option<&T> {
        self.expire_now();
        self.entries.get(index).map(|e| &e.value)
    }

    /// Live entries in insertion order.
    pub fn iter(&mut self) -> impl Iterator<Item = &T> {
        self.expire_now();
        self.entries.iter().map(|e| &e.value)
    }

    /// Live entries with the instant each one expires.
    pub fn iter_with_expiry(&mut self) -> impl Iterator<Item = (&T, Instant)> {
        self.expire_now();
        self.entries.iter().map(|e| (&e.value, e.expire_at))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn expire_now(&mut self) {
        let now = self.clock.now();
        self.expire(now, None);
    }

    fn expire(&mut self, now: Instant, incoming: Option<&T>) {
        let filter = self.filter.as_ref();
        self.entries.retain(|entry| {
            if entry.expire_at < now {
                return false;
            }
            match (filter, incoming) {
                (Some(superseded), Some(new)) => !superseded(new, &entry.value),
                _ => true,
            }
        });
    }
}

impl<T: Clone> MetricsContainer<T> {
    pub fn to_vec(&mut self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> std::fmt::Debug for MetricsContainer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsContainer")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
