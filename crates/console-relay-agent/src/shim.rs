//! Console interception.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use console_relay_core::{
    Arg, Console, ConsoleFn, LogLevel, LogRecord,
    codec::serialize,
    traits::LogSink,
};

use crate::session::Session;

/// Wraps the five console slots and restores them on demand.
///
/// Originals are captured once, when the shim is built. Wrappers always call
/// the captured original first, so what the application prints does not
/// depend on whether relaying is enabled. Dropping an active shim restores
/// the console.
pub struct ConsoleShim {
    console: Arc<Console>,
    originals: [ConsoleFn; 5],
    session: Arc<Session>,
    sink: Arc<dyn LogSink>,
    active: AtomicBool,
}

impl ConsoleShim {
    #[must_use]
    pub fn new(console: Arc<Console>, session: Arc<Session>, sink: Arc<dyn LogSink>) -> Self {
        let originals = LogLevel::ALL.map(|level| console.slot(level));
        Self {
            console,
            originals,
            session,
            sink,
            active: AtomicBool::new(false),
        }
    }

    /// The function that was in `level`'s slot when the shim was built.
    #[must_use]
    pub fn original(&self, level: LogLevel) -> ConsoleFn {
        Arc::clone(&self.originals[level.index()])
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Install the wrappers. Returns false if they were already installed.
    pub fn activate(&self) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        for level in LogLevel::ALL {
            self.console.replace(level, self.wrapper(level));
        }
        tracing::debug!("console shim activated");
        true
    }

    /// Put the originals back. Returns false if the shim was not active.
    pub fn deactivate(&self) -> bool {
        if self
            .active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        for level in LogLevel::ALL {
            self.console.replace(level, self.original(level));
        }
        tracing::debug!("console shim deactivated");
        true
    }

    fn wrapper(&self, level: LogLevel) -> ConsoleFn {
        let original = self.original(level);
        let report = self.original(LogLevel::Error);
        let session = Arc::clone(&self.session);
        let sink = Arc::clone(&self.sink);

        Arc::new(move |args: &[Arg]| {
            original(args);

            if !session.is_enabled() {
                return;
            }

            let seq = session.next_sequence();
            let record = LogRecord::now(level, serialize(args));
            if let Err(e) = sink.submit(record) {
                tracing::warn!(seq, %level, "failed to submit console record: {e}");
                report(&[Arg::from(format!(
                    "[console-relay] failed to relay {level} record #{seq}: {e}"
                ))]);
            }
        })
    }
}

impl Drop for ConsoleShim {
    fn drop(&mut self) {
        self.deactivate();
    }
}
