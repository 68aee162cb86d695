//! JSONL activity log: append-only line-delimited JSON.
//!
//! Each line is a self-contained JSON object. Lines are assembled in memory
//! and written with a single `write_all` so a concurrently tailing process
//! never sees a partial line.
//!
//! Fallback chain: primary file path, then stderr with an `[STP]` prefix,
//! then silent discard — a prune run must never fail because of logging.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// Activity event types for a prune run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ActivityEvent {
    RunStarted {
        root: String,
        max_age_secs: u64,
        dry_run: bool,
    },
    EntryDeleted {
        path: String,
        kind: String,
    },
    DeletionFailed {
        path: String,
        error_code: String,
        error_message: String,
    },
    EvaluationError {
        path: String,
        error_code: String,
        error_message: String,
    },
    RunCompleted {
        deleted: usize,
        failed: usize,
        duration_ms: u64,
    },
}

impl ActivityEvent {
    const fn severity(&self) -> Severity {
        match self {
            Self::RunStarted { .. } | Self::EntryDeleted { .. } | Self::RunCompleted { .. } => {
                Severity::Info
            }
            Self::DeletionFailed { .. } | Self::EvaluationError { .. } => Severity::Warning,
        }
    }
}

/// A single JSONL line: timestamp, severity, and the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub event: ActivityEvent,
}

/// Append-only activity logger with graceful degradation.
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    path: PathBuf,
}

impl ActivityLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one event. Infallible by design: failures fall back to stderr
    /// and finally to discard.
    pub fn log(&self, event: ActivityEvent) {
        let entry = LogEntry {
            ts: chrono::Utc::now().to_rfc3339(),
            severity: event.severity(),
            event,
        };
        let Ok(mut line) = serde_json::to_string(&entry) else {
            return;
        };
        line.push('\n');

        if self.append_line(&line).is_ok() {
            return;
        }
        let _ = std::io::stderr().write_all(format!("[STP] {line}").as_bytes());
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
