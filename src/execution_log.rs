//! Execution log
//!
//! An append-only record of stage durations and row counts. The log is a plain value: each stage
//! takes it, appends to it, and hands it back. Entries are never removed or reordered, so the
//! insertion order is the read order.

use std::fmt::Display;
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A single timestamped log message.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub timestamp: OffsetDateTime,
    pub message: String,
}

/// Append-only execution log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    /// Return an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, returning the extended log.
    #[must_use]
    pub fn append(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::info!("{}", message);
        self.entries.push(LogEntry {
            timestamp: OffsetDateTime::now_utc(),
            message,
        });
        self
    }

    /// Append a stage duration message.
    #[must_use]
    pub fn timed(self, what: impl Display, elapsed: Duration) -> Self {
        self.append(format!("{} completed in {:?}", what, elapsed))
    }

    /// Append all entries of another log after the entries of this one.
    #[must_use]
    pub fn extend(mut self, other: ExecutionLog) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the whole log as a single text blob, one entry per line.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let timestamp = entry
                    .timestamp
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| entry.timestamp.unix_timestamp().to_string());
                format!("[{}] {}\n", timestamp, entry.message)
            })
            .collect()
    }
}
