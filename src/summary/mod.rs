//! Background spike summaries.
//!
//! A spike entry is already durable by the time the coordinator hands it
//! here; everything in this module is best-effort. The worker asks an
//! OpenAI-compatible endpoint for a short natural-language explanation and
//! appends it to the event log under the spike's timestamp. A slow, absent
//! or failing endpoint degrades to "no summary", never to a stalled tick.

use crate::config::SummaryConfig;
use crate::event_log::EventLog;
use crate::metrics::Metrics;
use crate::types::SpikeRecord;
use client::{ChatMessage, SummaryClient};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod client;

const CHANNEL_DEPTH: usize = 64;

pub struct SummaryWorker {
    tx: mpsc::Sender<SpikeRecord>,
}

impl SummaryWorker {
    /// `None` when summaries are disabled, the endpoint is missing or the
    /// health check fails; the monitor runs fine without a worker.
    pub async fn try_new(
        cfg: &SummaryConfig,
        event_log: Arc<EventLog>,
        metrics: Arc<Metrics>,
    ) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty() {
            warn!("[summary] endpoint empty; summaries disabled");
            return None;
        }

        let timeout = Duration::from_millis(cfg.timeout_ms.max(1));
        let client = match SummaryClient::new(endpoint, &cfg.model, timeout) {
            Ok(client) => client,
            Err(err) => {
                warn!("[summary] failed to build HTTP client: {err}");
                return None;
            }
        };

        if let Err(err) = client.check_health().await {
            warn!("[summary] endpoint health check failed, summaries disabled: {err}");
            return None;
        }

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::spawn(run_worker(rx, client, event_log, metrics));
        Some(SummaryWorker { tx })
    }

    /// Non-blocking hand-off from the tick path. A full or closed channel
    /// drops the request; the spike entry itself is already in the log.
    pub fn request(&self, record: SpikeRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(err) => {
                warn!("[summary] dropping request: {err}");
                false
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<SpikeRecord>,
    client: SummaryClient,
    event_log: Arc<EventLog>,
    metrics: Arc<Metrics>,
) {
    while let Some(record) = rx.recv().await {
        let messages = build_messages(&record);
        match client.chat(&messages).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(
                    "[summary] {} spike at {} summarized",
                    record.metric,
                    record.at.format("%H:%M:%S")
                );
                match event_log.append_summary(record.metric, record.at, &text) {
                    Ok(()) => metrics.inc_summaries_appended(),
                    Err(err) => {
                        warn!("[summary] could not append analysis: {err}");
                        metrics.inc_summary_failures();
                    }
                }
            }
            Ok(_) => {
                warn!("[summary] endpoint returned empty text");
                metrics.inc_summary_failures();
            }
            Err(err) => {
                warn!("[summary] request failed: {err}");
                metrics.inc_summary_failures();
            }
        }
    }
}

fn build_messages(record: &SpikeRecord) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user",
            content: build_user_prompt(record),
        },
    ]
}

const SYSTEM_PROMPT: &str = "You are a Linux performance assistant. Explain the likely cause of the \
reported spike in two or three plain sentences, using only the data provided. No markdown, no \
lists, no speculation beyond the data.";

fn build_user_prompt(record: &SpikeRecord) -> String {
    format!(
        r#"SPIKE REPORT

Metric: {}
Peak value: {:.1}%
Time: {}
Sustained above threshold for: {}s

{}

What likely caused this spike?"#,
        record.metric.label(),
        record.value,
        record.at.format("%H:%M:%S"),
        record.sustained_for.as_secs(),
        record.top_processes
    )
}
