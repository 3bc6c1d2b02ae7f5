use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Ram,
}

impl MetricKind {
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Ram => "RAM",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricSample {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub taken_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageUnit {
    Percent,
    Mb,
}

impl fmt::Display for UsageUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageUnit::Percent => f.write_str("%"),
            UsageUnit::Mb => f.write_str("MB"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessUsage {
    pub name: String,
    pub pid: i32,
    pub value: f64,
    pub unit: UsageUnit,
}

/// Everything the log needs to write one spike entry. `top_processes` is the
/// pre-rendered attribution block so the entry stays intact even if ranking
/// state has moved on by the time it is flushed from the cache.
#[derive(Debug, Clone)]
pub struct SpikeRecord {
    pub metric: MetricKind,
    pub value: f64,
    pub sustained_for: Duration,
    pub at: DateTime<Local>,
    pub top_processes: String,
}
