//! Per-process attribution for spike entries.
//!
//! CPU ranking is delta-based: usage is computed from the growth of each
//! process's cumulative utime+stime between two ranking calls, normalized by
//! wall time and logical core count. RAM ranking is instantaneous resident
//! set size. Processes that vanish or deny access mid-enumeration are
//! skipped; a partial ranking is normal.

use crate::types::{MetricKind, ProcessUsage, UsageUnit};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankerError {
    #[error("process count must be at least 1")]
    InvalidCount,
    #[error("failed to enumerate processes: {0}")]
    Enumerate(#[from] procfs::ProcError),
}

pub struct ProcessRanker {
    clock_ticks: u64,
    page_size: u64,
    num_cpus: u64,
    min_elapsed: Duration,
    // pid -> cumulative utime+stime at the previous CPU pass
    baselines: HashMap<i32, u64>,
    last_cpu_pass: Option<Instant>,
}

impl ProcessRanker {
    /// `nominal_tick` floors the elapsed-time divisor so the first call and
    /// timer anomalies cannot blow the percentages up.
    pub fn new(nominal_tick: Duration) -> Self {
        // SAFETY: sysconf is thread-safe for this query and has no side effects.
        let cores = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        let num_cpus = if cores > 0 { cores as u64 } else { 1 };
        ProcessRanker {
            clock_ticks: procfs::ticks_per_second().max(1),
            page_size: procfs::page_size().max(1),
            num_cpus,
            min_elapsed: nominal_tick,
            baselines: HashMap::new(),
            last_cpu_pass: None,
        }
    }

    /// Moves the elapsed floor when the sampling cadence changes. Baselines
    /// stay valid; only the divisor floor follows the new tick.
    pub fn set_nominal_tick(&mut self, nominal_tick: Duration) {
        self.min_elapsed = nominal_tick;
    }

    pub fn nominal_tick(&self) -> Duration {
        self.min_elapsed
    }

    /// Top `count` processes by CPU usage since the previous call. The first
    /// call measures against a zero baseline, so long-lived busy processes
    /// dominate it; rankings settle from the second call on.
    pub fn top_by_cpu(&mut self, count: usize) -> Result<Vec<ProcessUsage>, RankerError> {
        if count == 0 {
            return Err(RankerError::InvalidCount);
        }

        let now = Instant::now();
        let elapsed = self
            .last_cpu_pass
            .map(|prev| now.duration_since(prev))
            .unwrap_or(self.min_elapsed)
            .max(self.min_elapsed);
        self.last_cpu_pass = Some(now);

        let mut entries = Vec::new();
        let mut seen: HashMap<i32, u64> = HashMap::new();
        for proc_result in procfs::process::all_processes()? {
            let Ok(process) = proc_result else { continue };
            let Ok(stat) = process.stat() else { continue };

            let total_ticks = stat.utime.saturating_add(stat.stime);
            let previous = self.baselines.get(&stat.pid).copied().unwrap_or(0);
            let delta = total_ticks.saturating_sub(previous);
            seen.insert(stat.pid, total_ticks);

            entries.push(ProcessUsage {
                name: display_name(&stat.comm),
                pid: stat.pid,
                value: usage_percent(delta, self.clock_ticks, elapsed, self.num_cpus),
                unit: UsageUnit::Percent,
            });
        }

        // Replacing the baselines with the pids seen this pass purges the dead ones.
        self.baselines = seen;

        Ok(take_top(entries, count))
    }

    /// Top `count` processes by resident set size, instantaneous.
    pub fn top_by_ram(&self, count: usize) -> Result<Vec<ProcessUsage>, RankerError> {
        if count == 0 {
            return Err(RankerError::InvalidCount);
        }

        let mut entries = Vec::new();
        for proc_result in procfs::process::all_processes()? {
            let Ok(process) = proc_result else { continue };
            let Ok(stat) = process.stat() else { continue };

            let rss_bytes = stat.rss.saturating_mul(self.page_size);
            entries.push(ProcessUsage {
                name: display_name(&stat.comm),
                pid: stat.pid,
                value: rss_bytes as f64 / (1024.0 * 1024.0),
                unit: UsageUnit::Mb,
            });
        }

        Ok(take_top(entries, count))
    }
}

/// CPU share of one process over one interval. Floored at zero by the
/// saturating delta and not capped above; a clock anomaly can push a
/// reading past 100 and the log shows it as measured.
fn usage_percent(delta_ticks: u64, clock_ticks: u64, elapsed: Duration, num_cpus: u64) -> f64 {
    let cpu_seconds = delta_ticks as f64 / clock_ticks as f64;
    let window = elapsed.as_secs_f64() * num_cpus as f64;
    if window <= 0.0 {
        return 0.0;
    }
    cpu_seconds / window * 100.0
}

fn take_top(mut entries: Vec<ProcessUsage>, count: usize) -> Vec<ProcessUsage> {
    // Stable sort: ties keep enumeration order.
    entries.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    entries.truncate(count);
    entries
}

fn display_name(comm: &str) -> String {
    let trimmed = comm.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The attribution block exactly as it appears in the log.
pub fn render_top(metric: MetricKind, entries: &[ProcessUsage]) -> String {
    let mut lines = vec![format!("Top {}-consuming processes:", metric.label())];
    if entries.is_empty() {
        lines.push("  (no process information available)".to_string());
    } else {
        for entry in entries {
            lines.push(format!(
                "  - {} (PID {}): {:.1}{}",
                entry.name, entry.pid, entry.value, entry.unit
            ));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_follows_delta_over_elapsed_and_cores() {
        let clock = 100;
        let elapsed = Duration::from_secs(1);
        let cores = 4;

        // 10s, 5s and 0s of CPU time within a 1s window on 4 cores.
        let p1 = usage_percent(10 * clock, clock, elapsed, cores);
        let p2 = usage_percent(5 * clock, clock, elapsed, cores);
        let p3 = usage_percent(0, clock, elapsed, cores);

        assert!((p1 - 250.0).abs() < 1e-9, "no upper clamp: {p1}");
        assert!((p2 - 125.0).abs() < 1e-9);
        assert_eq!(p3, 0.0);
        assert!(p1 > p2 && p2 > p3);
    }

    #[test]
    fn take_top_sorts_descending_and_truncates() {
        let entries = vec![
            usage("low", 1, 5.0),
            usage("high", 2, 90.0),
            usage("mid", 3, 40.0),
            usage("tiny", 4, 0.5),
        ];
        let top = take_top(entries, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "high");
        assert_eq!(top[1].name, "mid");
    }

    #[test]
    fn take_top_keeps_enumeration_order_on_ties() {
        let entries = vec![usage("first", 1, 50.0), usage("second", 2, 50.0)];
        let top = take_top(entries, 2);
        assert_eq!(top[0].name, "first");
        assert_eq!(top[1].name, "second");
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut ranker = ProcessRanker::new(Duration::from_millis(500));
        assert!(matches!(
            ranker.top_by_cpu(0),
            Err(RankerError::InvalidCount)
        ));
        assert!(matches!(
            ranker.top_by_ram(0),
            Err(RankerError::InvalidCount)
        ));
    }

    #[test]
    fn live_rankings_are_bounded_and_ordered() {
        let mut ranker = ProcessRanker::new(Duration::from_millis(500));
        let cpu = ranker.top_by_cpu(3).unwrap();
        assert!(cpu.len() <= 3);
        for pair in cpu.windows(2) {
            assert!(pair[0].value >= pair[1].value);
        }

        let ram = ranker.top_by_ram(3).unwrap();
        assert!(ram.len() <= 3);
        assert!(!ram.is_empty(), "a live host has at least this process");
        for pair in ram.windows(2) {
            assert!(pair[0].value >= pair[1].value);
        }
    }

    #[test]
    fn renders_the_log_attribution_block() {
        let entries = vec![usage("chrome", 4242, 41.7), usage("rustc", 991, 33.0)];
        let block = render_top(MetricKind::Cpu, &entries);
        assert_eq!(
            block,
            "Top CPU-consuming processes:\n  - chrome (PID 4242): 41.7%\n  - rustc (PID 991): 33.0%"
        );

        let ram = vec![ProcessUsage {
            name: "java".to_string(),
            pid: 7,
            value: 523.4,
            unit: UsageUnit::Mb,
        }];
        assert_eq!(
            render_top(MetricKind::Ram, &ram),
            "Top RAM-consuming processes:\n  - java (PID 7): 523.4MB"
        );

        assert_eq!(
            render_top(MetricKind::Cpu, &[]),
            "Top CPU-consuming processes:\n  (no process information available)"
        );
    }

    fn usage(name: &str, pid: i32, value: f64) -> ProcessUsage {
        ProcessUsage {
            name: name.to_string(),
            pid,
            value,
            unit: UsageUnit::Percent,
        }
    }
}
