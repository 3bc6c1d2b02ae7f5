//! Sustained-overload detection.
//!
//! One detector tracks one metric against a fixed threshold. Time spent
//! above the threshold accumulates tick by tick; the detector fires exactly
//! once when that time first reaches the required duration, then stays
//! silent until the value falls back to or below the threshold, which
//! resets the accumulation and re-arms it. There is no cooldown and no
//! hysteresis beyond the single threshold.

use crate::types::MetricKind;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SpikeDetector {
    metric: MetricKind,
    threshold_percent: f64,
    required: Duration,
    accumulated: Duration,
    active: bool,
}

impl SpikeDetector {
    pub fn new(metric: MetricKind, threshold_percent: f64, required: Duration) -> Self {
        SpikeDetector {
            metric,
            threshold_percent,
            required,
            accumulated: Duration::ZERO,
            active: false,
        }
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn required(&self) -> Duration {
        self.required
    }

    /// Feed one reading covering `elapsed` of wall time (normally the tick
    /// interval). Returns true exactly when the sustained condition is first
    /// met; staying above the threshold afterwards does not re-trigger.
    pub fn update(&mut self, value: f64, elapsed: Duration) -> bool {
        if value > self.threshold_percent {
            self.accumulated += elapsed;
            if self.accumulated >= self.required && !self.active {
                self.active = true;
                return true;
            }
        } else {
            self.accumulated = Duration::ZERO;
            self.active = false;
        }
        false
    }

    /// Drops accumulated state, used when thresholds change at runtime.
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.active = false;
    }
}
