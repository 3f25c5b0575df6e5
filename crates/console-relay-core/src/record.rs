//! Log records and the persisted line format.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Console method a record was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

impl LogLevel {
    /// Every console slot, in slot order.
    pub const ALL: [Self; 5] = [Self::Log, Self::Warn, Self::Error, Self::Info, Self::Debug];

    /// Slot index of this level.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Log => 0,
            Self::Warn => 1,
            Self::Error => 2,
            Self::Info => 3,
            Self::Debug => 4,
        }
    }

    /// Method name as the console exposes it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Upper-case tag used in persisted lines.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Log => "LOG",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Whether the original output of this slot goes to stderr.
    #[must_use]
    pub const fn is_stderr(self) -> bool {
        matches!(self, Self::Warn | Self::Error)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single intercepted console call.
///
/// Records are immutable once built and are consumed exactly once by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    message: String,
    level: LogLevel,
    timestamp: String,
}

impl LogRecord {
    /// Build a record stamped with the current UTC time.
    #[must_use]
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self::with_timestamp(
            level,
            message,
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    /// Build a record with an explicit ISO-8601 timestamp.
    #[must_use]
    pub fn with_timestamp(
        level: LogLevel,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: timestamp.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Render the record as one newline-terminated destination line.
    ///
    /// Format: `[<timestamp>] [<LEVEL>] <message>\n`.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("[{}] [{}] {}\n", self.timestamp, self.level.tag(), self.message)
    }
}
