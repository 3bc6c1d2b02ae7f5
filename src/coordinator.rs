//! Drives the pipeline from sampling through detection to the log entry.
//!
//! One coordinator owns the sampler, one detector per metric, the process
//! ranker and a handle to the event log. The spike entry is written
//! synchronously inside the tick that detected it; only the optional AI
//! summary leaves the tick path, through the background worker.

use crate::config::MonitorConfig;
use crate::detector::SpikeDetector;
use crate::event_log::EventLog;
use crate::metrics::Metrics;
use crate::ranker::{ProcessRanker, render_top};
use crate::sampler::MetricSampler;
use crate::summary::SummaryWorker;
use crate::types::{MetricKind, MetricSample, SpikeRecord};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

pub struct SpikeCoordinator {
    sampler: MetricSampler,
    cpu_detector: SpikeDetector,
    ram_detector: SpikeDetector,
    ranker: ProcessRanker,
    event_log: Arc<EventLog>,
    summary: Option<SummaryWorker>,
    metrics: Arc<Metrics>,
    top_count: usize,
    tick_interval: Duration,
    last_sample: Option<MetricSample>,
}

impl SpikeCoordinator {
    pub fn new(
        cfg: &MonitorConfig,
        event_log: Arc<EventLog>,
        summary: Option<SummaryWorker>,
        metrics: Arc<Metrics>,
    ) -> Self {
        SpikeCoordinator {
            sampler: MetricSampler::new(),
            cpu_detector: SpikeDetector::new(
                MetricKind::Cpu,
                cfg.cpu_threshold_percent,
                cfg.sustained(),
            ),
            ram_detector: SpikeDetector::new(
                MetricKind::Ram,
                cfg.ram_threshold_percent,
                cfg.sustained(),
            ),
            ranker: ProcessRanker::new(cfg.tick_interval()),
            event_log,
            summary,
            metrics,
            top_count: cfg.top_process_count,
            tick_interval: cfg.tick_interval(),
            last_sample: None,
        }
    }

    /// One full tick: take a fresh reading, then run detection on it.
    pub fn on_tick(&mut self) {
        let sample = self.sampler.sample();
        let elapsed = self.tick_interval;
        self.process_sample(sample, elapsed);
    }

    /// Detection core, separated from sampling so tests can drive it with
    /// synthetic readings. CPU is checked before RAM within a tick; the
    /// order carries no meaning.
    pub fn process_sample(&mut self, sample: MetricSample, elapsed: Duration) {
        self.metrics.inc_ticks();
        self.last_sample = Some(sample);
        self.check_metric(MetricKind::Cpu, &sample, elapsed);
        self.check_metric(MetricKind::Ram, &sample, elapsed);
    }

    /// Latest reading, for read-only observers like a status line or tray.
    pub fn current_metrics(&self) -> Option<MetricSample> {
        self.last_sample
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Swaps in new thresholds and cadence. Accumulated above-threshold time
    /// restarts from zero.
    pub fn apply_monitor_config(&mut self, cfg: &MonitorConfig) {
        self.cpu_detector = SpikeDetector::new(
            MetricKind::Cpu,
            cfg.cpu_threshold_percent,
            cfg.sustained(),
        );
        self.ram_detector = SpikeDetector::new(
            MetricKind::Ram,
            cfg.ram_threshold_percent,
            cfg.sustained(),
        );
        self.top_count = cfg.top_process_count;
        self.tick_interval = cfg.tick_interval();
        self.ranker.set_nominal_tick(cfg.tick_interval());
        info!(
            "[coordinator] config applied: cpu>{}% ram>{}% sustained={}s top={}",
            cfg.cpu_threshold_percent,
            cfg.ram_threshold_percent,
            cfg.sustained_secs,
            cfg.top_process_count
        );
    }

    fn check_metric(&mut self, metric: MetricKind, sample: &MetricSample, elapsed: Duration) {
        let value = match metric {
            MetricKind::Cpu => sample.cpu_percent,
            MetricKind::Ram => sample.ram_percent,
        };
        let fired = match metric {
            MetricKind::Cpu => self.cpu_detector.update(value, elapsed),
            MetricKind::Ram => self.ram_detector.update(value, elapsed),
        };
        if !fired {
            return;
        }

        let sustained_for = match metric {
            MetricKind::Cpu => self.cpu_detector.required(),
            MetricKind::Ram => self.ram_detector.required(),
        };
        self.metrics.inc_spikes_detected();
        info!(
            "[coordinator] {metric} spike: {value:.1}% sustained for {}s",
            sustained_for.as_secs()
        );

        let ranked = match metric {
            MetricKind::Cpu => self.ranker.top_by_cpu(self.top_count),
            MetricKind::Ram => self.ranker.top_by_ram(self.top_count),
        };
        // A failed ranking degrades to a placeholder; the spike entry itself
        // is never suppressed.
        let top_processes = match ranked {
            Ok(entries) => render_top(metric, &entries),
            Err(err) => {
                warn!("[coordinator] {metric} ranking failed: {err}");
                render_top(metric, &[])
            }
        };

        let record = SpikeRecord {
            metric,
            value,
            sustained_for,
            at: sample.taken_at,
            top_processes,
        };
        if let Err(err) = self.event_log.log_spike(&record) {
            warn!("[coordinator] could not log {metric} spike: {err}");
            return;
        }
        if let Some(worker) = &self.summary {
            worker.request(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::fs;
    use tempfile::TempDir;

    const TICK: Duration = Duration::from_millis(500);

    fn coordinator(dir: &TempDir) -> (SpikeCoordinator, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let log = Arc::new(EventLog::new(
            dir.path().join("events.log"),
            14,
            200,
            Arc::clone(&metrics),
        ));
        let coordinator =
            SpikeCoordinator::new(&MonitorConfig::default(), log, None, Arc::clone(&metrics));
        (coordinator, metrics)
    }

    fn sample(cpu: f64, ram: f64) -> MetricSample {
        MetricSample {
            cpu_percent: cpu,
            ram_percent: ram,
            taken_at: Local::now(),
        }
    }

    #[test]
    fn sustained_cpu_overload_logs_one_spike() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, metrics) = coordinator(&dir);

        for _ in 0..25 {
            coordinator.process_sample(sample(95.0, 10.0), TICK);
        }

        assert_eq!(metrics.spikes_detected(), 1);
        let content = fs::read_to_string(dir.path().join("events.log")).unwrap();
        assert_eq!(content.matches("CPU spike detected (>= 10s)").count(), 1);
        assert!(content.contains("95.0%"));
        assert!(content.contains("Top CPU-consuming processes:"));
        assert!(!content.contains("RAM spike detected"));
    }

    #[test]
    fn recovery_and_second_overload_log_two_spikes() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, metrics) = coordinator(&dir);

        for _ in 0..20 {
            coordinator.process_sample(sample(95.0, 10.0), TICK);
        }
        coordinator.process_sample(sample(50.0, 10.0), TICK);
        for _ in 0..20 {
            coordinator.process_sample(sample(97.0, 10.0), TICK);
        }

        assert_eq!(metrics.spikes_detected(), 2);
        let content = fs::read_to_string(dir.path().join("events.log")).unwrap();
        assert_eq!(content.matches("CPU spike detected").count(), 2);
    }

    #[test]
    fn both_metrics_spiking_log_cpu_then_ram() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, metrics) = coordinator(&dir);

        for _ in 0..20 {
            coordinator.process_sample(sample(95.0, 92.0), TICK);
        }

        assert_eq!(metrics.spikes_detected(), 2);
        let content = fs::read_to_string(dir.path().join("events.log")).unwrap();
        let cpu = content.find("CPU spike detected").unwrap();
        let ram = content.find("RAM spike detected").unwrap();
        assert!(cpu < ram);
        assert!(content.contains("Top RAM-consuming processes:"));
    }

    #[test]
    fn exposes_latest_sample_readonly() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, _) = coordinator(&dir);

        assert!(coordinator.current_metrics().is_none());
        coordinator.process_sample(sample(33.0, 44.0), TICK);
        let latest = coordinator.current_metrics().unwrap();
        assert_eq!(latest.cpu_percent, 33.0);
        assert_eq!(latest.ram_percent, 44.0);
    }

    #[test]
    fn config_change_resets_accumulation() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, metrics) = coordinator(&dir);

        for _ in 0..19 {
            coordinator.process_sample(sample(95.0, 10.0), TICK);
        }
        let mut cfg = MonitorConfig::default();
        cfg.sustained_secs = 5;
        coordinator.apply_monitor_config(&cfg);

        // 5s requirement restarts from zero: 9 ticks stay silent, the 10th fires.
        for _ in 0..9 {
            coordinator.process_sample(sample(95.0, 10.0), TICK);
        }
        assert_eq!(metrics.spikes_detected(), 0);
        coordinator.process_sample(sample(95.0, 10.0), TICK);
        assert_eq!(metrics.spikes_detected(), 1);

        let content = fs::read_to_string(dir.path().join("events.log")).unwrap();
        assert!(content.contains("CPU spike detected (>= 5s)"));
    }

    #[test]
    fn config_change_moves_the_ranker_elapsed_floor() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, _) = coordinator(&dir);
        assert_eq!(coordinator.ranker.nominal_tick(), TICK);

        let mut cfg = MonitorConfig::default();
        cfg.tick_interval_ms = 2_000;
        coordinator.apply_monitor_config(&cfg);

        assert_eq!(
            coordinator.ranker.nominal_tick(),
            Duration::from_millis(2_000)
        );
        assert_eq!(coordinator.tick_interval(), Duration::from_millis(2_000));
    }
}
