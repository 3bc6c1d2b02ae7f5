pub mod config;
pub mod coordinator;
pub mod detector;
pub mod event_log;
pub mod metrics;
pub mod ranker;
pub mod sampler;
pub mod summary;
pub mod types;

pub use config::{Config, LogConfig, MonitorConfig, SummaryConfig};
pub use coordinator::SpikeCoordinator;
pub use detector::SpikeDetector;
pub use event_log::{EventLog, EventLogError};
pub use metrics::Metrics;
pub use ranker::{ProcessRanker, RankerError};
pub use sampler::MetricSampler;
pub use summary::SummaryWorker;
pub use types::{MetricKind, MetricSample, ProcessUsage, SpikeRecord, UsageUnit};
