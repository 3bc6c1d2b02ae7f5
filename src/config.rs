//! Daemon configuration (TOML).

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/spikewatch/spikewatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub log: LogConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_interval_ms: u64,
    pub cpu_threshold_percent: f64,
    pub ram_threshold_percent: f64,
    pub sustained_secs: u64,
    pub top_process_count: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            tick_interval_ms: 500,
            cpu_threshold_percent: 80.0,
            ram_threshold_percent: 80.0,
            sustained_secs: 10,
            top_process_count: 3,
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sustained(&self) -> Duration {
        Duration::from_secs(self.sustained_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Overrides the XDG-resolved location when set.
    pub path: Option<PathBuf>,
    pub retention_days: u32,
    pub max_cached_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            path: None,
            retention_days: 14,
            max_cached_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        SummaryConfig {
            enabled: false,
            endpoint: String::new(),
            model: "local-sre-llm".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file falls back to defaults; a present-but-broken file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("[config] {} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.monitor.sustained_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.sustained_secs must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("monitor.cpu_threshold_percent", self.monitor.cpu_threshold_percent),
            ("monitor.ram_threshold_percent", self.monitor.ram_threshold_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within (0, 100], got {value}"
                )));
            }
        }
        if !(1..=10).contains(&self.monitor.top_process_count) {
            return Err(ConfigError::Invalid(format!(
                "monitor.top_process_count must be within 1..=10, got {}",
                self.monitor.top_process_count
            )));
        }
        if self.log.max_cached_lines == 0 {
            return Err(ConfigError::Invalid(
                "log.max_cached_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.monitor.sustained(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            [monitor]
            cpu_threshold_percent = 90.0
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.cpu_threshold_percent, 90.0);
        assert_eq!(config.monitor.tick_interval_ms, 500);
        assert_eq!(config.log.retention_days, 14);
        assert!(!config.summary.enabled);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = Config::default();
        config.monitor.top_process_count = 5;
        config.log.path = Some(PathBuf::from("/tmp/events.log"));
        config.summary.enabled = true;
        config.summary.endpoint = "http://127.0.0.1:8080/v1/chat/completions".to_string();

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.monitor.top_process_count, 5);
        assert_eq!(parsed.log.path, config.log.path);
        assert_eq!(parsed.summary.endpoint, config.summary.endpoint);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = Config::default();
        config.monitor.top_process_count = 0;
        assert!(config.validate().is_err());

        config.monitor.top_process_count = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.cpu_threshold_percent = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_or_default_handles_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/spikewatch.toml")).unwrap();
        assert_eq!(config.monitor.top_process_count, 3);
    }
}
