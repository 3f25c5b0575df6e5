//! FIFO write serialization per destination.
//!
//! Every destination gets a lane: an unbounded queue drained by a single
//! worker task. A job's full side effect (existence check, read, compose,
//! write) settles before the next job on the same lane starts, so two
//! near-simultaneous records can never interleave a read-modify-write.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use console_relay_core::{
    Arg, ConsoleFn, LogRecord,
    traits::{LogSink, SinkError, Storage, StorageError},
};
use futures::future::join_all;
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::{AbortHandle, JoinHandle},
};

/// Write error.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Write lane closed before the record was persisted")]
    Closed,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Append one line to a destination.
///
/// Uses the native append primitive when the storage has one; otherwise
/// checks existence and either writes the line as the full content or reads,
/// concatenates and writes back. The fallback is only safe when calls for the
/// same destination are serialized.
///
/// # Errors
/// Returns error if any storage step fails.
pub async fn persist_line(
    storage: &dyn Storage,
    destination: &str,
    line: &str,
) -> Result<(), StorageError> {
    if storage.supports_append() {
        return storage.append(destination, line).await;
    }

    if storage.exists(destination).await? {
        let mut content = storage.read(destination).await?;
        content.push_str(line);
        storage.write(destination, &content).await
    } else {
        storage.write(destination, line).await
    }
}

struct Job {
    record: LogRecord,
    done: oneshot::Sender<Result<(), StorageError>>,
}

struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
    pending: Arc<AtomicUsize>,
}

/// Handle to the eventual outcome of one enqueued write.
#[derive(Debug)]
pub struct WriteTicket {
    rx: oneshot::Receiver<Result<(), StorageError>>,
}

impl WriteTicket {
    /// Wait for the write to settle.
    ///
    /// # Errors
    /// Returns the storage failure, or `Closed` if the lane was torn down
    /// before the write ran.
    pub async fn outcome(self) -> Result<(), WriteError> {
        match self.rx.await {
            Ok(result) => result.map_err(WriteError::from),
            Err(_) => Err(WriteError::Closed),
        }
    }
}

/// Result of tearing down the serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Lanes that were closed.
    pub lanes: usize,
    /// Writes still queued or in flight when the timeout expired.
    pub unflushed: usize,
}

impl DrainReport {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.unflushed == 0
    }
}

/// Serializes persistence of records, one job at a time per destination.
///
/// `enqueue` never blocks and never waits on a lock held by a worker, so it
/// may be called from synchronous console wrappers and from a failing job's
/// own error report.
pub struct WriteSerializer {
    storage: Arc<dyn Storage>,
    reporter: Option<ConsoleFn>,
    runtime: Handle,
    lanes: Mutex<HashMap<String, Lane>>,
}

impl WriteSerializer {
    /// Create a serializer over `storage`.
    ///
    /// Failures are reported through `reporter` (typically the original,
    /// unwrapped `console.error`) in addition to `tracing`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, reporter: Option<ConsoleFn>) -> Self {
        Self {
            storage,
            reporter,
            runtime: Handle::current(),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a record for `destination`.
    ///
    /// # Errors
    /// Returns `Closed` if no worker could be started for the destination.
    pub fn enqueue(&self, destination: &str, record: LogRecord) -> Result<WriteTicket, WriteError> {
        let (done, rx) = oneshot::channel();
        let job = Job { record, done };

        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let lane = lanes
            .entry(destination.to_string())
            .or_insert_with(|| self.spawn_lane(destination));

        lane.pending.fetch_add(1, Ordering::SeqCst);
        let Err(mpsc::error::SendError(job)) = lane.tx.send(job) else {
            return Ok(WriteTicket { rx });
        };
        lane.pending.fetch_sub(1, Ordering::SeqCst);

        // The worker only stops early if a storage call panicked.
        tracing::warn!(destination, "write lane worker stopped, restarting");
        let lane = self.spawn_lane(destination);
        lane.pending.fetch_add(1, Ordering::SeqCst);
        lane.tx.send(job).map_err(|_| WriteError::Closed)?;
        lanes.insert(destination.to_string(), lane);

        Ok(WriteTicket { rx })
    }

    /// Writes queued or in flight across all lanes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|lane| lane.pending.load(Ordering::SeqCst))
            .sum()
    }

    /// Close every lane and wait up to `timeout` for queued writes.
    ///
    /// Workers still running at the deadline are aborted and their
    /// remaining jobs counted as unflushed. Later `enqueue` calls open new
    /// lanes.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        let lanes: Vec<Lane> = self
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, lane)| lane)
            .collect();

        let count = lanes.len();
        let mut workers = Vec::with_capacity(count);
        let mut aborts: Vec<AbortHandle> = Vec::with_capacity(count);
        let mut counters = Vec::with_capacity(count);
        for Lane {
            tx,
            worker,
            pending,
        } in lanes
        {
            drop(tx);
            aborts.push(worker.abort_handle());
            workers.push(worker);
            counters.push(pending);
        }

        if tokio::time::timeout(timeout, join_all(workers)).await.is_ok() {
            tracing::debug!(lanes = count, "write lanes drained");
            return DrainReport {
                lanes: count,
                unflushed: 0,
            };
        }

        for abort in aborts {
            abort.abort();
        }
        let unflushed = counters
            .iter()
            .map(|pending| pending.load(Ordering::SeqCst))
            .sum();
        tracing::warn!(lanes = count, unflushed, "write lanes did not drain in time");
        DrainReport {
            lanes: count,
            unflushed,
        }
    }

    fn spawn_lane(&self, destination: &str) -> Lane {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = self.runtime.spawn(run_lane(
            Arc::clone(&self.storage),
            destination.to_string(),
            rx,
            self.reporter.clone(),
            Arc::clone(&pending),
        ));
        Lane {
            tx,
            worker,
            pending,
        }
    }
}

async fn run_lane(
    storage: Arc<dyn Storage>,
    destination: String,
    mut rx: mpsc::UnboundedReceiver<Job>,
    reporter: Option<ConsoleFn>,
    pending: Arc<AtomicUsize>,
) {
    tracing::debug!(%destination, "write lane started");

    while let Some(job) = rx.recv().await {
        let outcome = persist_line(storage.as_ref(), &destination, &job.record.to_line()).await;

        if let Err(e) = &outcome {
            tracing::error!(%destination, "Failed to persist log record: {e}");
            if let Some(report) = &reporter {
                report(&[Arg::from(format!(
                    "[console-relay] failed to write to {destination}: {e}"
                ))]);
            }
        }

        pending.fetch_sub(1, Ordering::SeqCst);
        let _ = job.done.send(outcome);
    }

    tracing::debug!(%destination, "write lane closed");
}

/// Sink persisting every record to one destination through a serializer.
pub struct LocalSink {
    writer: Arc<WriteSerializer>,
    destination: String,
}

impl LocalSink {
    #[must_use]
    pub fn new(writer: Arc<WriteSerializer>, destination: impl Into<String>) -> Self {
        Self {
            writer,
            destination: destination.into(),
        }
    }
}

impl LogSink for LocalSink {
    fn submit(&self, record: LogRecord) -> Result<(), SinkError> {
        self.writer
            .enqueue(&self.destination, record)
            .map(drop)
            .map_err(|_| SinkError::Closed)
    }
}
