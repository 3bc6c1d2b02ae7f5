//! The durable spike log.
//!
//! A line-oriented, append-only text file sectioned by calendar day, meant
//! to be tailed and read by people. Writes that fail land in a bounded
//! in-memory cache and are flushed, in order, ahead of the next successful
//! write, so a locked or briefly unwritable file costs no entries until the
//! cache overflows (oldest lines are dropped first). All log state lives
//! behind one mutex; no await happens while it is held.

use crate::metrics::Metrics;
use crate::types::{MetricKind, SpikeRecord};
use chrono::{DateTime, Days, Local, NaiveDate};
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

const SECTION_RULE: &str = "----------------------------------------";

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log is closed")]
    Closed,
    #[error("failed to rewrite {path}: {source}")]
    Rewrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

struct LogState {
    cache: VecDeque<String>,
    seen_dates: HashSet<NaiveDate>,
    closed: bool,
}

pub struct EventLog {
    path: PathBuf,
    retention_days: u32,
    max_cached_lines: usize,
    metrics: Arc<Metrics>,
    state: Mutex<LogState>,
}

impl EventLog {
    pub fn new(
        path: PathBuf,
        retention_days: u32,
        max_cached_lines: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        // One pass over whatever is already on disk, so headers written by a
        // previous run are never duplicated.
        let seen_dates = scan_header_dates(&path);
        info!("[event-log] writing to {}", path.display());
        EventLog {
            path,
            retention_days,
            max_cached_lines,
            metrics,
            state: Mutex::new(LogState {
                cache: VecDeque::new(),
                seen_dates,
                closed: false,
            }),
        }
    }

    /// `$XDG_DATA_HOME/spikewatch/events.log`, falling back to
    /// `$HOME/.local/share`, then the system temp directory. Each candidate
    /// is tried in order; the first that can be prepared wins, so a data
    /// directory that exists but cannot be written does not pin the log to a
    /// dead location.
    pub fn default_path() -> PathBuf {
        let mut bases: Vec<PathBuf> = Vec::new();
        if let Some(dir) = env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
        {
            bases.push(dir);
        }
        if let Some(mut home) = env::var_os("HOME")
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
        {
            home.push(".local");
            home.push("share");
            bases.push(home);
        }
        bases.push(env::temp_dir());
        choose_log_location(bases)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the day's section header if this date has none yet. Repeated
    /// calls within one day are no-ops after the first.
    pub fn ensure_daily_header(&self) -> Result<(), EventLogError> {
        let mut state = self.lock_open()?;
        let lines = header_lines_if_needed(&mut state, Local::now());
        if !lines.is_empty() {
            self.write_or_cache(&mut state, lines);
        }
        Ok(())
    }

    /// Appends one spike entry (preceded by the day's header when needed).
    /// File trouble degrades to the cache; the only hard error is `Closed`.
    pub fn log_spike(&self, record: &SpikeRecord) -> Result<(), EventLogError> {
        let mut state = self.lock_open()?;
        let mut lines = header_lines_if_needed(&mut state, record.at);
        lines.push(format!(
            "{} - {} spike detected (>= {}s): {:.1}%",
            record.at.format("%H:%M:%S"),
            record.metric.label(),
            record.sustained_for.as_secs(),
            record.value
        ));
        lines.extend(record.top_processes.lines().map(str::to_string));
        lines.push(String::new());
        self.write_or_cache(&mut state, lines);
        Ok(())
    }

    /// Appends the model's text for an earlier spike, keyed in the log by
    /// metric and the spike's wall-clock time.
    pub fn append_summary(
        &self,
        metric: MetricKind,
        spike_at: DateTime<Local>,
        text: &str,
    ) -> Result<(), EventLogError> {
        let body = text.trim();
        if body.is_empty() {
            return Ok(());
        }
        let mut state = self.lock_open()?;
        let mut lines = header_lines_if_needed(&mut state, spike_at);
        lines.push(format!(
            "AI Analysis (for {} spike at {}):",
            metric.label(),
            spike_at.format("%H:%M:%S")
        ));
        for line in body.lines() {
            lines.push(format!("  {}", line.trim_end()));
        }
        lines.push(String::new());
        self.write_or_cache(&mut state, lines);
        Ok(())
    }

    /// Drops whole dated sections older than the retention window and
    /// rewrites the file atomically. Returns whether anything was removed.
    /// A missing file is a no-op; running twice changes nothing the second
    /// time.
    pub fn prune_old_entries(&self) -> Result<bool, EventLogError> {
        let mut state = self.lock_open()?;
        // Get pending lines into the file first so the walk sees the whole stream.
        let _ = persist(&self.path, &self.metrics, &mut state, &[]);

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(EventLogError::Rewrite {
                    path: self.path.clone(),
                    source: err,
                });
            }
        };

        let cutoff = Local::now()
            .date_naive()
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN);
        let (retained, dropped) = retain_recent_sections(&content, cutoff);
        if !dropped {
            debug!("[event-log] nothing older than {cutoff} to prune");
            return Ok(false);
        }

        let tmp_path = self.path.with_extension("tmp");
        let rewrite_err = |source| EventLogError::Rewrite {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp_path, retained.as_bytes()).map_err(rewrite_err)?;
        fs::rename(&tmp_path, &self.path).map_err(rewrite_err)?;
        info!(
            "[event-log] pruned sections older than {cutoff} from {}",
            self.path.display()
        );
        Ok(true)
    }

    /// Final best-effort flush; every operation afterwards fails with
    /// `Closed`. Safe to call more than once.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        if !state.cache.is_empty()
            && let Err((_, err)) = persist(&self.path, &self.metrics, &mut state, &[])
        {
            warn!(
                "[event-log] {} lines lost at close, {} still unwritable: {err}",
                state.cache.len(),
                self.path.display()
            );
        }
        state.closed = true;
        debug!("[event-log] closed");
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, LogState>, EventLogError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(EventLogError::Closed);
        }
        Ok(state)
    }

    fn write_or_cache(&self, state: &mut LogState, lines: Vec<String>) {
        match persist(&self.path, &self.metrics, state, &lines) {
            Ok(()) => {}
            Err((written, err)) => {
                self.metrics.inc_write_failures();
                let pending = lines.len() - written;
                warn!(
                    "[event-log] write to {} failed, caching {pending} lines: {err}",
                    self.path.display()
                );
                for line in lines.into_iter().skip(written) {
                    // Bounded for any cap, including one below the
                    // config-validated minimum.
                    if state.cache.len() >= self.max_cached_lines
                        && state.cache.pop_front().is_some()
                    {
                        self.metrics.inc_cache_evictions();
                    }
                    state.cache.push_back(line);
                }
                self.metrics.inc_lines_cached(pending as u64);
            }
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.closed && !state.cache.is_empty() {
            let _ = persist(&self.path, &self.metrics, state, &[]);
        }
    }
}

/// Flushes the cache, then appends `new_lines`, stopping at the first I/O
/// failure. The error carries how many of `new_lines` made it out, so the
/// caller caches only the remainder.
fn persist(
    path: &Path,
    metrics: &Metrics,
    state: &mut LogState,
    new_lines: &[String],
) -> Result<(), (usize, std::io::Error)> {
    if state.cache.is_empty() && new_lines.is_empty() {
        return Ok(());
    }
    let mut file = open_for_append(path).map_err(|err| (0, err))?;
    while let Some(line) = state.cache.front() {
        if let Err(err) = write_line(&mut file, line) {
            return Err((0, err));
        }
        state.cache.pop_front();
        metrics.inc_lines_flushed(1);
    }
    for (written, line) in new_lines.iter().enumerate() {
        if let Err(err) = write_line(&mut file, line) {
            return Err((written, err));
        }
    }
    Ok(())
}

fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")
}

fn open_for_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    clear_readonly(path);
    OpenOptions::new().create(true).append(true).open(path)
}

/// A stray read-only bit (set by an external viewer or backup tool) would
/// otherwise wedge every append until someone notices.
fn clear_readonly(path: &Path) {
    if let Ok(metadata) = fs::metadata(path) {
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            permissions.set_readonly(false);
            let _ = fs::set_permissions(path, permissions);
        }
    }
}

/// First base under which `spikewatch/events.log` can be prepared (directory
/// created, file opened for append). When every base fails, the last
/// candidate is returned anyway and writes cache until it recovers.
fn choose_log_location(bases: Vec<PathBuf>) -> PathBuf {
    let mut candidate = PathBuf::new();
    for base in bases {
        candidate = base.join("spikewatch").join("events.log");
        if open_for_append(&candidate).is_ok() {
            return candidate;
        }
        warn!(
            "[event-log] cannot prepare {}, trying the next location",
            candidate.display()
        );
    }
    candidate
}

fn header_lines_if_needed(state: &mut LogState, at: DateTime<Local>) -> Vec<String> {
    let date = at.date_naive();
    if state.seen_dates.contains(&date) {
        return Vec::new();
    }
    // Marked seen as soon as the lines are enqueued, even if they sit in the
    // cache for a while, so a flaky disk cannot produce duplicate headers.
    state.seen_dates.insert(date);
    vec![
        format!("===== {} =====", at.format("%Y-%m-%d (%A)")),
        format!("Started: {} (Local)", at.format("%H:%M:%S")),
        SECTION_RULE.to_string(),
        String::new(),
    ]
}

fn scan_header_dates(path: &Path) -> HashSet<NaiveDate> {
    let Ok(content) = fs::read_to_string(path) else {
        return HashSet::new();
    };
    content.lines().filter_map(parse_header_date).collect()
}

fn parse_header_date(line: &str) -> Option<NaiveDate> {
    let inner = line.strip_prefix("===== ")?.strip_suffix(" =====")?;
    let date_part = inner.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Walks the file section by section, keeping everything dated `cutoff` or
/// newer. Lines before the first header carry no date and are always kept.
fn retain_recent_sections(content: &str, cutoff: NaiveDate) -> (String, bool) {
    let mut kept: Vec<&str> = Vec::new();
    let mut keep_current = true;
    let mut dropped = false;
    for line in content.lines() {
        if let Some(date) = parse_header_date(line) {
            keep_current = date >= cutoff;
            if !keep_current {
                dropped = true;
            }
        }
        if keep_current {
            kept.push(line);
        }
    }

    if !dropped {
        return (content.to_string(), false);
    }

    // Rebuild line by line so blank lines keep their own terminators and the
    // retained sections stay byte-for-byte identical.
    let mut retained = String::new();
    for line in kept {
        retained.push_str(line);
        retained.push('\n');
    }
    while retained.starts_with('\n') {
        retained.remove(0);
    }
    (retained, true)
}
