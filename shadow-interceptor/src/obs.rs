use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::MakeWriter;

/// JSONL sink for interception decisions.
///
/// Active file: <log_dir>/events.jsonl, hourly rolling.
#[derive(Clone)]
pub struct ObsSink {
    events: NonBlocking,
}

// Keep the guard alive for process lifetime, otherwise lines may drop.
static EVENTS_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct InterceptEvent {
    pub ts: DateTime<Utc>,
    pub adapter: &'static str,
    pub outcome: &'static str,
    pub rule_id: Option<String>,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Serialized form (injects dataset)
#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(rename = "@timestamp")]
    ts: &'a DateTime<Utc>,
    dataset: &'static str,
    adapter: &'a str,
    outcome: &'a str,
    rule_id: &'a Option<String>,
    method: &'a str,
    url: &'a str,
    status: Option<u16>,
    error: &'a Option<String>,
}

impl ObsSink {
    pub fn new(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("create log_dir failed: {}", log_dir.display()))?;

        let appender = tracing_appender::rolling::hourly(log_dir, "events.jsonl");
        let (events, guard) = tracing_appender::non_blocking(appender);
        let _ = EVENTS_GUARD.set(guard);

        Ok(Self { events })
    }

    /// Write one event line. Caller does NOT provide dataset.
    pub fn write_event(&self, rec: &InterceptEvent) {
        let line = EventLine {
            ts: &rec.ts,
            dataset: "intercept",
            adapter: rec.adapter,
            outcome: rec.outcome,
            rule_id: &rec.rule_id,
            method: &rec.method,
            url: &rec.url,
            status: rec.status,
            error: &rec.error,
        };

        if let Ok(json) = serde_json::to_string(&line) {
            let mut w = self.events.make_writer();
            let _ = w.write_all(json.as_bytes());
            let _ = w.write_all(b"\n");
        }
    }
}
