//! Logger capability with replaceable output slots.

use std::{
    io::Write,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    codec::{Arg, serialize},
    record::LogLevel,
};

/// One console output function.
pub type ConsoleFn = Arc<dyn Fn(&[Arg]) + Send + Sync>;

/// The application's console: one output function per log level.
///
/// Applications call [`Console::emit`] (or the per-level helpers); an
/// interception layer swaps slots with [`Console::replace`]. Slots are
/// cloned out of the lock before they run, so a slot may itself call back
/// into the console.
pub struct Console {
    slots: RwLock<[ConsoleFn; 5]>,
}

impl Console {
    /// Create a console from a factory producing one function per level.
    #[must_use]
    pub fn from_fn(mut make: impl FnMut(LogLevel) -> ConsoleFn) -> Self {
        Self {
            slots: RwLock::new(LogLevel::ALL.map(&mut make)),
        }
    }

    /// Console writing log/info/debug to stdout and warn/error to stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::from_fn(|level| {
            Arc::new(move |args: &[Arg]| {
                let line = serialize(args);
                // Output errors (closed pipe) must not reach the application.
                let _ = if level.is_stderr() {
                    writeln!(std::io::stderr().lock(), "{line}")
                } else {
                    writeln!(std::io::stdout().lock(), "{line}")
                };
            })
        })
    }

    /// Console that discards everything.
    #[must_use]
    pub fn silent() -> Self {
        Self::from_fn(|_| Arc::new(|_: &[Arg]| {}))
    }

    /// Current function installed in a slot.
    #[must_use]
    pub fn slot(&self, level: LogLevel) -> ConsoleFn {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slots[level.index()])
    }

    /// Install a function in a slot, returning the previous one.
    pub fn replace(&self, level: LogLevel, f: ConsoleFn) -> ConsoleFn {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut slots[level.index()], f)
    }

    /// Call the function currently installed for `level`.
    pub fn emit(&self, level: LogLevel, args: &[Arg]) {
        let f = self.slot(level);
        f(args);
    }

    pub fn log(&self, args: &[Arg]) {
        self.emit(LogLevel::Log, args);
    }

    pub fn warn(&self, args: &[Arg]) {
        self.emit(LogLevel::Warn, args);
    }

    pub fn error(&self, args: &[Arg]) {
        self.emit(LogLevel::Error, args);
    }

    pub fn info(&self, args: &[Arg]) {
        self.emit(LogLevel::Info, args);
    }

    pub fn debug(&self, args: &[Arg]) {
        self.emit(LogLevel::Debug, args);
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::stdio()
    }
}
