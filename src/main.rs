use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use spikewatch::config::{Config, DEFAULT_CONFIG_PATH};
use spikewatch::coordinator::SpikeCoordinator;
use spikewatch::event_log::EventLog;
use spikewatch::metrics::Metrics;
use spikewatch::summary::SummaryWorker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;

/// Status line cadence, in ticks.
const STATUS_EVERY_TICKS: u64 = 120;

#[derive(Parser, Debug)]
struct Args {
    /// Path to the TOML config file
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write the event log here instead of the configured/XDG location
    #[clap(long)]
    log_path: Option<PathBuf>,

    /// Prune sections older than the retention window, then exit
    #[clap(long)]
    prune_now: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::load_or_default(&args.config).context("loading configuration")?;

    let metrics = Arc::new(Metrics::new());
    let log_path = args
        .log_path
        .clone()
        .or_else(|| config.log.path.clone())
        .unwrap_or_else(EventLog::default_path);
    let event_log = Arc::new(EventLog::new(
        log_path,
        config.log.retention_days,
        config.log.max_cached_lines,
        Arc::clone(&metrics),
    ));

    if args.prune_now {
        let dropped = event_log.prune_old_entries().context("pruning event log")?;
        info!(
            "[main] prune finished: {}",
            if dropped { "sections removed" } else { "nothing to remove" }
        );
        return Ok(());
    }

    match event_log.prune_old_entries() {
        Ok(true) => info!("[main] startup prune removed old sections"),
        Ok(false) => {}
        Err(err) => warn!("[main] startup prune failed: {err}"),
    }
    if let Err(err) = event_log.ensure_daily_header() {
        warn!("[main] could not open the daily section: {err}");
    }

    let summary =
        SummaryWorker::try_new(&config.summary, Arc::clone(&event_log), Arc::clone(&metrics))
            .await;
    if summary.is_some() {
        info!("[main] spike summaries enabled via {}", config.summary.endpoint);
    }

    let mut coordinator = SpikeCoordinator::new(
        &config.monitor,
        Arc::clone(&event_log),
        summary,
        Arc::clone(&metrics),
    );

    info!(
        "[main] monitoring every {}ms (cpu>{}%, ram>{}%, sustained {}s)",
        config.monitor.tick_interval_ms,
        config.monitor.cpu_threshold_percent,
        config.monitor.ram_threshold_percent,
        config.monitor.sustained_secs
    );

    let mut ticker = new_ticker(coordinator.tick_interval());
    let mut sighup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                coordinator.on_tick();
                ticks += 1;
                if ticks % STATUS_EVERY_TICKS == 0 {
                    log_status(&coordinator, &metrics);
                }
            }
            _ = sighup.recv() => {
                match Config::load_or_default(&args.config) {
                    Ok(new_config) => {
                        let cadence_changed =
                            new_config.monitor.tick_interval() != coordinator.tick_interval();
                        coordinator.apply_monitor_config(&new_config.monitor);
                        if cadence_changed {
                            ticker = new_ticker(coordinator.tick_interval());
                        }
                        info!("[main] monitor settings reloaded; log and summary sections apply on restart");
                    }
                    Err(err) => warn!("[main] reload failed, keeping current config: {err}"),
                }
            }
            _ = sigterm.recv() => {
                info!("[main] received SIGTERM, shutting down");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!("[main] ctrl-c handler failed: {err}");
                }
                info!("[main] shutting down");
                break;
            }
        }
    }

    event_log.close();
    Ok(())
}

fn new_ticker(interval: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn log_status(coordinator: &SpikeCoordinator, metrics: &Metrics) {
    let snap = metrics.snapshot();
    if let Some(sample) = coordinator.current_metrics() {
        info!(
            "[main] cpu={:.1}% ram={:.1}% spikes={} cached={} evicted={} flushed={} summaries={} summary_errors={}",
            sample.cpu_percent,
            sample.ram_percent,
            snap.spikes_detected,
            snap.lines_cached,
            snap.cache_evictions,
            snap.lines_flushed,
            snap.summaries_appended,
            snap.summary_failures
        );
    }
}
