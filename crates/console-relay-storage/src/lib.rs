//! Storage backends and write serialization for relayed console records.
//!
//! Provides:
//! - `WriteSerializer` - One-at-a-time, in-order persistence per destination
//! - `LocalSink` - Record sink writing through a serializer
//! - Storage implementations (memory, file)

pub mod serializer;
pub mod storage;

pub use serializer::{DrainReport, LocalSink, WriteError, WriteSerializer, WriteTicket, persist_line};
