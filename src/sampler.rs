//! System-wide CPU and RAM readings via sysinfo.

use crate::types::MetricSample;
use chrono::Local;
use sysinfo::System;

/// Owns the sysinfo handle for the lifetime of the monitor. Dropping the
/// sampler releases the handle; there is no separate shutdown call.
pub struct MetricSampler {
    system: System,
}

impl MetricSampler {
    /// The first sysinfo CPU reading after construction is always 0%, so
    /// construction performs one throwaway refresh to establish a baseline.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        MetricSampler { system }
    }

    /// Never fails: unreadable counters degrade to 0 rather than an error.
    pub fn sample(&mut self) -> MetricSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let raw_cpu = f64::from(self.system.global_cpu_usage());
        let cpu_percent = if raw_cpu.is_finite() {
            raw_cpu.clamp(0.0, 100.0)
        } else {
            0.0
        };

        let total = self.system.total_memory();
        let available = self.system.available_memory();
        let ram_percent = if total == 0 {
            0.0
        } else {
            let used = total.saturating_sub(available);
            (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };

        MetricSample {
            cpu_percent,
            ram_percent,
            taken_at: Local::now(),
        }
    }
}

impl Default for MetricSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_in_range() {
        let mut sampler = MetricSampler::new();
        for _ in 0..3 {
            let sample = sampler.sample();
            assert!((0.0..=100.0).contains(&sample.cpu_percent));
            assert!((0.0..=100.0).contains(&sample.ram_percent));
        }
    }

    #[test]
    fn ram_reading_is_nonzero_on_a_live_host() {
        let mut sampler = MetricSampler::new();
        let sample = sampler.sample();
        assert!(sample.ram_percent > 0.0, "host should report some memory in use");
    }
}
