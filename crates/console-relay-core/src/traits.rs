//! Core traits for persistence and record sinks.

use async_trait::async_trait;
use thiserror::Error;

use crate::LogRecord;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Destination not found: {0}")]
    NotFound(String),
    #[error("Native append is not supported by this storage")]
    Unsupported,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Byte-oriented, file-like destinations identified by a path-like string.
///
/// Each call is assumed atomic on its own; sequences of calls are not.
/// Callers that compose calls (read-modify-write) must serialize them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check whether a destination exists.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Read the full content of a destination.
    async fn read(&self, path: &str) -> Result<String, StorageError>;

    /// Overwrite a destination with `content`, creating it if needed.
    async fn write(&self, path: &str, content: &str) -> Result<(), StorageError>;

    /// Whether [`Storage::append`] is a native primitive.
    fn supports_append(&self) -> bool {
        false
    }

    /// Append `content` to a destination, creating it if needed.
    async fn append(&self, _path: &str, _content: &str) -> Result<(), StorageError> {
        Err(StorageError::Unsupported)
    }
}

/// Sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink is closed")]
    Closed,
}

/// Consumer of intercepted records.
///
/// `submit` is called synchronously from console wrappers and must not
/// block on I/O: sinks hand the record off and return.
pub trait LogSink: Send + Sync {
    /// Hand off a record.
    ///
    /// # Errors
    /// Returns error if the record could not be accepted.
    fn submit(&self, record: LogRecord) -> Result<(), SinkError>;
}
