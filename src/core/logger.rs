//! Log sinks for entries produced by jobs.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{LogEntry, LogLevel};

/// Destination for [`LogEntry`] records emitted by jobs.
pub trait JobLogger: Send + Sync {
    /// Record a log entry.
    fn log(&self, entry: &LogEntry);
}

/// Forwards job log entries to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingJobLogger;

impl JobLogger for TracingJobLogger {
    fn log(&self, entry: &LogEntry) {
        let fields = entry.fields.as_ref().map(ToString::to_string).unwrap_or_default();
        match entry.level {
            LogLevel::Trace => {
                tracing::trace!(job = %entry.logger, fields = %fields, "{}", entry.message);
            }
            LogLevel::Debug => {
                tracing::debug!(job = %entry.logger, fields = %fields, "{}", entry.message);
            }
            LogLevel::Info => {
                tracing::info!(job = %entry.logger, fields = %fields, "{}", entry.message);
            }
            LogLevel::Warn => {
                tracing::warn!(job = %entry.logger, fields = %fields, "{}", entry.message);
            }
            LogLevel::Error => {
                tracing::error!(job = %entry.logger, fields = %fields, "{}", entry.message);
            }
        }
    }
}

/// In-memory log sink with a bounded buffer, for testing and dev.
#[derive(Debug)]
pub struct InMemoryJobLogger {
    entries: Mutex<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl InMemoryJobLogger {
    /// Create a sink keeping at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Create a shared sink.
    pub fn shared(max_entries: usize) -> Arc<Self> {
        Arc::new(Self::new(max_entries))
    }

    /// Snapshot of stored entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing was logged (or everything was evicted).
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl JobLogger for InMemoryJobLogger {
    fn log(&self, entry: &LogEntry) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJobLogger;

impl JobLogger for NullJobLogger {
    fn log(&self, _entry: &LogEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_logger_is_bounded() {
        let logger = InMemoryJobLogger::new(2);
        for i in 0..3 {
            logger.log(&LogEntry::new(LogLevel::Info, "job", format!("line {i}")));
        }
        let messages: Vec<_> = logger.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["line 1", "line 2"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let logger = InMemoryJobLogger::new(0);
        logger.log(&LogEntry::new(LogLevel::Warn, "job", "dropped"));
        assert!(logger.is_empty());
    }
}
