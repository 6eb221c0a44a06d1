//! The collector's own health metrics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use statrelay_metrics::{Counter, Gauge, LabelSet, Metric};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// Ingestion counters, updated lock-free from connection tasks.
#[derive(Debug, Default)]
pub struct SelfMetrics {
    metrics_total: AtomicU64,
    sessions_total: AtomicU64,
    bad_metrics_total: AtomicU64,
}

impl SelfMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metric(&self) {
        self.metrics_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad_metric(&self) {
        self.bad_metrics_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics_total(&self) -> u64 {
        self.metrics_total.load(Ordering::Relaxed)
    }

    pub fn sessions_total(&self) -> u64 {
        self.sessions_total.load(Ordering::Relaxed)
    }

    pub fn bad_metrics_total(&self) -> u64 {
        self.bad_metrics_total.load(Ordering::Relaxed)
    }

    /// Snapshot as renderable metrics. `working` reports whether the last
    /// collector render produced output in time.
    pub fn snapshot(&self, working: bool, rss_bytes: Option<u64>) -> Vec<Metric> {
        let none = LabelSet::new();
        let mut metrics: Vec<Metric> = Vec::with_capacity(5);

        let mut gauge = Gauge::new(
            "collector_working",
            "Is the collector able to render metrics",
        );
        gauge.observe(&none, if working { 1.0 } else { 0.0 });
        metrics.push(gauge.into());

        if let Some(rss) = rss_bytes {
            let mut gauge = Gauge::new("collector_rss", "Total memory used by collector process");
            gauge.observe(&none, rss as f64);
            metrics.push(gauge.into());
        }

        for (name, help, value) in [
            (
                "collector_metrics_total",
                "Total metrics processed by the collector",
                self.metrics_total(),
            ),
            (
                "collector_sessions_total",
                "Total send-metrics sessions processed by the collector",
                self.sessions_total(),
            ),
            (
                "collector_bad_metrics_total",
                "Total metrics the collector failed to process",
                self.bad_metrics_total(),
            ),
        ] {
            let mut counter = Counter::new(name, help);
            counter.observe(&none, value as f64);
            metrics.push(counter.into());
        }
        metrics
    }
}

/// Reads this process's resident set size.
#[derive(Clone)]
pub struct RssProbe {
    system: Arc<Mutex<System>>,
    pid: Option<sysinfo::Pid>,
}

impl Default for RssProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl RssProbe {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new_with_specifics(
                RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory()),
            ))),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Blocking read; refreshes the process entry from the OS.
    pub fn rss_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|p| p.memory())
    }

    /// [`rss_bytes`](Self::rss_bytes) on the blocking pool, for use from
    /// async handlers.
    pub async fn sample(&self) -> Option<u64> {
        let probe = self.clone();
        tokio::task::spawn_blocking(move || probe.rss_bytes())
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrelay_metrics::{render_all, RenderContext};

    #[test]
    fn counters_render_in_order() {
        let stats = SelfMetrics::new();
        stats.record_session();
        stats.record_metric();
        stats.record_metric();
        stats.record_bad_metric();

        let text = render_all(&stats.snapshot(true, None), &RenderContext::default());
        let working = text.find("collector_working 1\n").unwrap();
        let metrics = text.find("collector_metrics_total 2\n").unwrap();
        let sessions = text.find("collector_sessions_total 1\n").unwrap();
        let bad = text.find("collector_bad_metrics_total 1\n").unwrap();
        assert!(working < metrics && metrics < sessions && sessions < bad);
        assert!(!text.contains("collector_rss"));
    }

    #[test]
    fn rss_is_reported_when_known() {
        let text = render_all(
            &SelfMetrics::new().snapshot(false, Some(4096)),
            &RenderContext::default(),
        );
        assert!(text.contains("collector_working 0\n"));
        assert!(text.contains("collector_rss 4096\n"));
    }

    #[test]
    fn probe_reads_own_memory() {
        // Some sandboxes hide /proc; only check the value when present.
        if let Some(rss) = RssProbe::new().rss_bytes() {
            assert!(rss > 0);
        }
    }

    #[tokio::test]
    async fn sample_runs_off_the_runtime() {
        let probe = RssProbe::new();
        let sampled = probe.sample().await;
        assert_eq!(sampled.is_some(), probe.rss_bytes().is_some());
        if let Some(rss) = sampled {
            assert!(rss > 0);
        }
    }
}
