//! Core abstractions for console relaying.
//!
//! This crate provides the fundamental building blocks:
//! - `LogRecord` / `LogLevel` - Immutable log records and their line format
//! - `Arg` / `serialize` - Total codec from console arguments to one line
//! - `Console` - Logger capability with five replaceable output slots
//! - `AgentConfig` - Startup configuration
//! - Storage and sink traits

pub mod codec;
pub mod config;
pub mod console;
pub mod record;
pub mod traits;

pub use codec::{Arg, Structured, serialize};
pub use config::{AgentConfig, ConfigError, Topology};
pub use console::{Console, ConsoleFn};
pub use record::{LogLevel, LogRecord};
pub use traits::{LogSink, SinkError, Storage, StorageError};
