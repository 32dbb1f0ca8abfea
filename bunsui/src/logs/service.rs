// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Log Service
//!
//! Aggregates a session's operation logs from the object store: loads the
//! session's log shards, parses each line as a JSON log record, applies
//! filters, and returns entries ordered ascending by timestamp regardless
//! of physical shard order.
//!
//! A malformed line never aborts aggregation; it becomes a synthetic
//! ERROR-level entry noting the parse failure, as does a shard that cannot
//! be fetched.
//!
//! Downloads reformat filtered entries as Text, Json, Yaml, or Csv (the
//! Csv header merges the union of context keys). `tail_session_logs` is a
//! lazy stream: it emits the last `initial_lines` entries, then polls the
//! store at a coarse interval for new entries, ending after the owning
//! session reaches a terminal state and one final drain has run.

use chrono::{DateTime, Utc};
use futures::Stream;
use regex::RegexBuilder;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use bunsui_domain::BunsuiError;

use crate::infrastructure::repositories::SessionRepository;
use crate::infrastructure::storage::ObjectStorageManager;

/// Severity levels of the log record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            "CRITICAL" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Output format of a log download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
    Yaml,
    Csv,
}

/// One parsed log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub logger: String,
    pub pid: u64,
    pub hostname: String,
    pub context: HashMap<String, Value>,
    /// The original record, kept for Json/Yaml downloads.
    pub raw: Value,
}

impl LogEntry {
    /// Parses one JSONL line. A malformed line yields a synthetic
    /// ERROR-level entry describing the failure instead of an error.
    pub fn from_json_line(line: &str) -> Self {
        let parsed: Result<Value, _> = serde_json::from_str(line.trim());
        match parsed {
            Ok(record) => {
                let timestamp = record
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let level = record
                    .get("level")
                    .and_then(Value::as_str)
                    .and_then(LogLevel::parse)
                    .unwrap_or(LogLevel::Info);
                let context = record
                    .get("context")
                    .and_then(Value::as_object)
                    .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                Self {
                    timestamp,
                    level,
                    message: record.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
                    logger: record
                        .get("logger")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    pid: record.get("pid").and_then(Value::as_u64).unwrap_or(0),
                    hostname: record
                        .get("hostname")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    context,
                    raw: record,
                }
            }
            Err(error) => Self::synthetic_error(
                format!("Failed to parse log entry: {}", line),
                [("parse_error".to_string(), Value::from(error.to_string()))].into(),
            ),
        }
    }

    fn synthetic_error(message: String, context: HashMap<String, Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message,
            logger: "log_parser".to_string(),
            pid: 0,
            hostname: "unknown".to_string(),
            context,
            raw: Value::Object(Default::default()),
        }
    }
}

/// Filtering criteria for log queries.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub pattern: Option<String>,
    pub case_sensitive: bool,
    pub job_id: Option<String>,
    pub pipeline_id: Option<String>,
}

impl LogFilter {
    fn apply(&self, entries: Vec<LogEntry>) -> Vec<LogEntry> {
        // An unparseable pattern disables pattern filtering rather than
        // failing the whole query.
        let regex = self.pattern.as_deref().and_then(|pattern| {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(!self.case_sensitive)
                .build();
            if compiled.is_err() {
                warn!(pattern, "ignoring invalid log filter pattern");
            }
            compiled.ok()
        });

        entries
            .into_iter()
            .filter(|entry| {
                if let Some(level) = self.level {
                    if entry.level != level {
                        return false;
                    }
                }
                if let Some(since) = self.since {
                    if entry.timestamp < since {
                        return false;
                    }
                }
                if let Some(until) = self.until {
                    if entry.timestamp > until {
                        return false;
                    }
                }
                if let Some(regex) = &regex {
                    if !regex.is_match(&entry.message) {
                        return false;
                    }
                }
                if let Some(job_id) = &self.job_id {
                    if entry.context.get("job_id").and_then(Value::as_str) != Some(job_id.as_str()) {
                        return false;
                    }
                }
                if let Some(pipeline_id) = &self.pipeline_id {
                    if entry.context.get("pipeline_id").and_then(Value::as_str) != Some(pipeline_id.as_str()) {
                        return false;
                    }
                }
                true
            })
            .collect()
    }
}

/// Per-job log counters in a summary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobLogStats {
    pub entries: usize,
    pub errors: usize,
}

/// First/last entry timestamps of a summary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Aggregate log statistics for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    pub session_id: String,
    pub total_entries: usize,
    pub levels: HashMap<LogLevel, usize>,
    pub jobs: HashMap<String, JobLogStats>,
    pub time_range: TimeRange,
}

/// Service for log retrieval, download, summarization, and tailing.
pub struct LogService {
    storage: Arc<ObjectStorageManager>,
    sessions: Arc<SessionRepository>,
    tail_poll_interval: Duration,
}

impl LogService {
    pub fn new(storage: Arc<ObjectStorageManager>, sessions: Arc<SessionRepository>) -> Self {
        Self {
            storage,
            sessions,
            tail_poll_interval: Duration::from_secs(5),
        }
    }

    /// Overrides the tail polling cadence.
    pub fn with_tail_poll_interval(mut self, interval: Duration) -> Self {
        self.tail_poll_interval = interval;
        self
    }

    /// Loads a session's log entries, filtered and sorted ascending by
    /// timestamp. A positive `limit` keeps the tail of that length.
    ///
    /// # Errors
    ///
    /// * `Validation` - the session does not exist
    pub async fn get_session_logs(
        &self,
        session_id: &str,
        filter: &LogFilter,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>, BunsuiError> {
        Self::collect_logs(&self.storage, &self.sessions, session_id, filter, limit).await
    }

    async fn collect_logs(
        storage: &ObjectStorageManager,
        sessions: &SessionRepository,
        session_id: &str,
        filter: &LogFilter,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>, BunsuiError> {
        if sessions.get_session(session_id).await?.is_none() {
            return Err(BunsuiError::validation(format!("Session {} not found", session_id)));
        }

        let shards = storage.list_session_logs(session_id, None).await?;
        let mut entries = Vec::new();
        for shard in shards {
            match storage.get_log_object(&shard.key).await {
                Ok(Some(body)) => {
                    let text = String::from_utf8_lossy(&body);
                    for line in text.lines() {
                        if !line.trim().is_empty() {
                            entries.push(LogEntry::from_json_line(line));
                        }
                    }
                }
                Ok(None) => {}
                // A failed shard read becomes an entry; aggregation goes on.
                Err(error) => entries.push(LogEntry::synthetic_error(
                    format!("Failed to load log shard {}: {}", shard.key, error),
                    [("shard".to_string(), Value::from(shard.key.clone()))].into(),
                )),
            }
        }

        let mut entries = filter.apply(entries);
        entries.sort_by_key(|entry| entry.timestamp);
        if let Some(limit) = limit {
            if limit > 0 && entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }
        Ok(entries)
    }

    /// Downloads a session's filtered logs in the requested format.
    pub async fn download_session_logs(
        &self,
        session_id: &str,
        format: LogFormat,
        filter: &LogFilter,
    ) -> Result<String, BunsuiError> {
        let entries = self.get_session_logs(session_id, filter, None).await?;
        match format {
            LogFormat::Json => {
                let raw: Vec<&Value> = entries.iter().map(|entry| &entry.raw).collect();
                Ok(serde_json::to_string_pretty(&raw)?)
            }
            LogFormat::Yaml => {
                let raw: Vec<&Value> = entries.iter().map(|entry| &entry.raw).collect();
                serde_yaml::to_string(&raw).map_err(|e| BunsuiError::serialization(e.to_string()))
            }
            LogFormat::Csv => Ok(render_csv(&entries)),
            LogFormat::Text => Ok(entries
                .iter()
                .map(|entry| {
                    format!(
                        "{} {} - {}",
                        entry.level,
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.message
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Aggregates per-level and per-job counters and the entry time range.
    pub async fn get_log_summary(&self, session_id: &str) -> Result<LogSummary, BunsuiError> {
        let entries = self.get_session_logs(session_id, &LogFilter::default(), None).await?;

        let mut levels: HashMap<LogLevel, usize> = HashMap::new();
        let mut jobs: HashMap<String, JobLogStats> = HashMap::new();
        let mut time_range = TimeRange::default();

        for entry in &entries {
            *levels.entry(entry.level).or_default() += 1;

            let job_id = entry
                .context
                .get("job_id")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let stats = jobs.entry(job_id).or_default();
            stats.entries += 1;
            if matches!(entry.level, LogLevel::Error | LogLevel::Critical) {
                stats.errors += 1;
            }

            if time_range.start.is_none_or(|start| entry.timestamp < start) {
                time_range.start = Some(entry.timestamp);
            }
            if time_range.end.is_none_or(|end| entry.timestamp > end) {
                time_range.end = Some(entry.timestamp);
            }
        }

        Ok(LogSummary {
            session_id: session_id.to_string(),
            total_entries: entries.len(),
            levels,
            jobs,
            time_range,
        })
    }

    /// Tails a session's logs: the last `initial_lines` matching entries,
    /// then new entries as they become visible, polling at the configured
    /// cadence. The stream ends once the session is terminal and a final
    /// drain has run; dropping the stream cancels the tail.
    pub fn tail_session_logs(
        &self,
        session_id: &str,
        filter: LogFilter,
        initial_lines: usize,
    ) -> impl Stream<Item = Result<LogEntry, BunsuiError>> + Send {
        let storage = Arc::clone(&self.storage);
        let sessions = Arc::clone(&self.sessions);
        let session_id = session_id.to_string();
        let poll_interval = self.tail_poll_interval;

        async_stream::stream! {
            let initial =
                match Self::collect_logs(&storage, &sessions, &session_id, &filter, Some(initial_lines)).await {
                    Ok(entries) => entries,
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                };
            let mut last_seen = initial.last().map(|entry| entry.timestamp);
            for entry in initial {
                yield Ok(entry);
            }

            loop {
                let terminal = match sessions.get_session(&session_id).await {
                    Ok(Some(session)) => session.is_terminal(),
                    Ok(None) => true,
                    Err(error) => {
                        debug!(%session_id, %error, "tail could not refresh session state");
                        false
                    }
                };

                tokio::time::sleep(poll_interval).await;

                match Self::collect_logs(&storage, &sessions, &session_id, &filter, None).await {
                    Ok(entries) => {
                        for entry in entries {
                            if last_seen.is_none_or(|seen| entry.timestamp > seen) {
                                last_seen = Some(entry.timestamp);
                                yield Ok(entry);
                            }
                        }
                    }
                    Err(error) => {
                        debug!(%session_id, %error, "tail poll failed, will retry");
                    }
                }

                // One final drain ran after the terminal observation.
                if terminal {
                    break;
                }
            }
        }
    }
}

fn render_csv(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let context_keys: BTreeSet<&str> = entries
        .iter()
        .flat_map(|entry| entry.context.keys().map(String::as_str))
        .collect();

    let mut header: Vec<&str> = vec!["timestamp", "level", "message", "logger", "pid", "hostname"];
    header.extend(context_keys.iter().copied());

    let mut out = String::new();
    out.push_str(&header.join(","));
    out.push('\n');

    for entry in entries {
        let mut row: Vec<String> = vec![
            entry.timestamp.to_rfc3339(),
            entry.level.to_string(),
            csv_escape(&entry.message),
            csv_escape(&entry.logger),
            entry.pid.to_string(),
            csv_escape(&entry.hostname),
        ];
        for key in &context_keys {
            let cell = match entry.context.get(*key) {
                Some(Value::String(s)) => csv_escape(s),
                Some(other) => csv_escape(&other.to_string()),
                None => String::new(),
            };
            row.push(cell);
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
