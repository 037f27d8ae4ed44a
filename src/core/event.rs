//! Event vocabulary exchanged with running jobs.
//!
//! Inputs ([`JobInput`]) flow from a caller into a job, outputs ([`JobEvent`])
//! flow from the job to its subscribers. Both are closed sum types; consumers
//! match on them exhaustively.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::JobDescription;
use crate::util::clock::now_ms;

/// Message sent by a caller into a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobInput {
    /// Ask the job to answer with [`JobEventKind::Pong`].
    Ping,
    /// Best-effort cancellation of the job.
    Stop,
    /// Value for the job's default input channel.
    ChannelMessage {
        /// Payload.
        message: Value,
    },
    /// Fail the job's default input channel.
    ChannelError {
        /// Error payload.
        error: Value,
    },
    /// Close the job's default input channel.
    ChannelComplete,
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Very verbose diagnostics.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected that the job recovered from.
    Warn,
    /// A failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A log record produced by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Name of the logger that produced the entry (usually the job name).
    pub logger: String,
    /// Human readable message.
    pub message: String,
    /// Creation time in milliseconds since epoch.
    pub timestamp_ms: u64,
    /// Optional structured fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(level: LogLevel, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            logger: logger.into(),
            message: message.into(),
            timestamp_ms: now_ms(),
            fields: None,
        }
    }

    /// Attach structured fields.
    #[must_use]
    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Payload of a [`JobEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobEventKind {
    /// The job was created; always the first event of a run.
    Create,
    /// The handler started.
    Start,
    /// Answer to [`JobInput::Ping`].
    Pong,
    /// A log entry from the handler.
    Log {
        /// The entry.
        entry: LogEntry,
    },
    /// Progress report. Not clamped by the event model.
    Progress {
        /// Reported value, nominally in `[0, 1]`.
        value: f64,
    },
    /// A job output value.
    Output {
        /// The value.
        value: Value,
    },
    /// A value written to a named channel.
    ChannelMessage {
        /// Channel name.
        name: String,
        /// Payload.
        message: Value,
    },
    /// A named channel failed.
    ChannelError {
        /// Channel name.
        name: String,
        /// Error payload.
        error: Value,
    },
    /// A named channel completed.
    ChannelComplete {
        /// Channel name.
        name: String,
    },
    /// The handler finished; always the last event of a successful run.
    End,
}

impl JobEventKind {
    /// True for `Create`, `Start` and `End`.
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Create | Self::Start | Self::End)
    }
}

/// Message emitted by a running job, tagged with the job's description.
#[derive(Debug, Clone)]
pub struct JobEvent {
    /// Description of the job that emitted the event.
    pub description: Arc<JobDescription>,
    /// Event payload.
    pub kind: JobEventKind,
}

impl JobEvent {
    /// Create an event for `description`.
    pub const fn new(description: Arc<JobDescription>, kind: JobEventKind) -> Self {
        Self { description, kind }
    }
}

/// Observable state of a scheduled job. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Scheduled, waiting for the pause gate or dependencies.
    Queued,
    /// `Create` was emitted; input validation and the handler come next.
    Created,
    /// The handler emitted `Start`.
    Started,
    /// The handler emitted `End`.
    Ended,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Created => write!(f, "Created"),
            Self::Started => write!(f, "Started"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_wire_format() {
        let input = JobInput::ChannelMessage { message: json!(1) };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"kind": "channelMessage", "message": 1})
        );
        let ping: JobInput = serde_json::from_value(json!({"kind": "ping"})).unwrap();
        assert_eq!(ping, JobInput::Ping);
    }

    #[test]
    fn test_event_kind_wire_format() {
        let kind = JobEventKind::Progress { value: 0.5 };
        assert_eq!(
            serde_json::to_value(&kind).unwrap(),
            json!({"kind": "progress", "value": 0.5})
        );
        assert!(JobEventKind::End.is_lifecycle());
        assert!(!JobEventKind::Pong.is_lifecycle());
    }

    #[test]
    fn test_state_ordering() {
        assert!(JobState::Queued < JobState::Created);
        assert!(JobState::Started < JobState::Ended);
        assert_eq!(JobState::Started.to_string(), "Started");
    }
}
