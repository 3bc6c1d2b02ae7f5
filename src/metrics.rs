//! Process-local counters for the periodic status line. No network export.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    ticks: AtomicU64,
    spikes_detected: AtomicU64,
    lines_cached: AtomicU64,
    cache_evictions: AtomicU64,
    lines_flushed: AtomicU64,
    write_failures: AtomicU64,
    summaries_appended: AtomicU64,
    summary_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub spikes_detected: u64,
    pub lines_cached: u64,
    pub cache_evictions: u64,
    pub lines_flushed: u64,
    pub write_failures: u64,
    pub summaries_appended: u64,
    pub summary_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn inc_ticks(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_spikes_detected(&self) {
        self.spikes_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_lines_cached(&self, count: u64) {
        self.lines_cached.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_cache_evictions(&self) {
        self.cache_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_lines_flushed(&self, count: u64) {
        self.lines_flushed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_summaries_appended(&self) {
        self.summaries_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_summary_failures(&self) {
        self.summary_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spikes_detected(&self) -> u64 {
        self.spikes_detected.load(Ordering::Relaxed)
    }

    pub fn cache_evictions(&self) -> u64 {
        self.cache_evictions.load(Ordering::Relaxed)
    }

    pub fn summaries_appended(&self) -> u64 {
        self.summaries_appended.load(Ordering::Relaxed)
    }

    pub fn summary_failures(&self) -> u64 {
        self.summary_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            spikes_detected: self.spikes_detected.load(Ordering::Relaxed),
            lines_cached: self.lines_cached.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            lines_flushed: self.lines_flushed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            summaries_appended: self.summaries_appended.load(Ordering::Relaxed),
            summary_failures: self.summary_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.inc_ticks();
        metrics.inc_ticks();
        metrics.inc_spikes_detected();
        metrics.inc_lines_cached(3);
        metrics.inc_lines_flushed(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.spikes_detected, 1);
        assert_eq!(snap.lines_cached, 3);
        assert_eq!(snap.lines_flushed, 3);
        assert_eq!(snap.write_failures, 0);
    }
}
