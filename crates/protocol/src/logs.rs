use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
    /// Forward compatibility: unknown levels deserialize here.
    #[serde(other)]
    Unknown,
}

impl LogLevel {
    /// Wire name, as used in feed filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// A single line from the appliance log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    pub message: String,
}

/// Frames pushed on the log feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogFeedMessage {
    /// A log line to append to the tail.
    Log(LogEntry),
    /// Out-of-band notice (e.g. log streaming unsupported on this host).
    /// Never stored as a log line.
    Info { message: String },
}
