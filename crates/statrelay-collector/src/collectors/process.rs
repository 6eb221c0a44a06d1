//! Per-process resource snapshots.
//!
//! Each reporting process periodically sends its latest figures. Only the
//! newest snapshot per `hostname` + `pid` is kept, and a process that stops
//! reporting drops out after [`SNAPSHOT_TTL`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use statrelay_metrics::{Counter, Gauge, LabelSet, Metric};

use crate::clock::Clock;
use crate::container::MetricsContainer;
use crate::dispatch::TypeCollector;
use crate::error::{CollectorError, CollectorResult};

pub const TYPE_NAME: &str = "process";

pub const SNAPSHOT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessSnapshot {
    pub hostname: String,
    pub pid: u32,
    #[serde(default)]
    pub rss: Option<f64>,
    #[serde(default)]
    pub cpu_seconds: Option<f64>,
    #[serde(default)]
    pub open_fds: Option<f64>,
    #[serde(default)]
    pub threads: Option<f64>,
    #[serde(default)]
    pub custom_labels: Option<LabelSet>,
}

impl ProcessSnapshot {
    fn labels(&self) -> LabelSet {
        let base = LabelSet::new()
            .with("hostname", self.hostname.as_str())
            .with("pid", self.pid.to_string());
        match &self.custom_labels {
            Some(custom) => base.merged_with(custom),
            None => base,
        }
    }
}

pub struct ProcessCollector {
    snapshots: MetricsContainer<ProcessSnapshot>,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector {
    pub fn new() -> Self {
        Self {
            snapshots: MetricsContainer::new(SNAPSHOT_TTL).with_filter(same_process),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshots: MetricsContainer::new(SNAPSHOT_TTL)
                .with_clock(clock)
                .with_filter(same_process),
        }
    }
}

fn same_process(new: &ProcessSnapshot, existing: &ProcessSnapshot) -> bool {
    new.pid == existing.pid && new.hostname == existing.hostname
}

impl TypeCollector for ProcessCollector {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn collect(&mut self, message: &Value) -> CollectorResult<()> {
        let snapshot = ProcessSnapshot::deserialize(message)
            .map_err(|err| CollectorError::InvalidValue(err.to_string()))?;
        self.snapshots.append(snapshot);
        Ok(())
    }

    fn metrics(&mut self) -> Vec<Metric> {
        let mut rss = Gauge::new("process_rss_bytes", "Resident set size of the process.");
        let mut cpu = Counter::new(
            "process_cpu_seconds_total",
            "Total user and system CPU time spent in seconds.",
        );
        let mut fds = Gauge::new("process_open_fds", "Number of open file descriptors.");
        let mut threads = Gauge::new("process_threads", "Number of OS threads in the process.");

        for snapshot in self.snapshots.iter() {
            let labels = snapshot.labels();
            if let Some(v) = snapshot.rss {
                rss.observe(&labels, v);
            }
            if let Some(v) = snapshot.cpu_seconds {
                cpu.observe(&labels, v);
            }
            if let Some(v) = snapshot.open_fds {
                fds.observe(&labels, v);
            }
            if let Some(v) = snapshot.threads {
                threads.observe(&labels, v);
            }
        }

        let mut metrics = Vec::new();
        if rss.series_count() > 0 {
            metrics.push(rss.into());
        }
        if cpu.series_count() > 0 {
            metrics.push(cpu.into());
        }
        if fds.series_count() > 0 {
            metrics.push(fds.into());
        }
        if threads.series_count() > 0 {
            metrics.push(threads.into());
        }
        metrics
    }
}
