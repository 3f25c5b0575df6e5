//! Session state for one agent instance.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Snapshot of the fields reported to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub enabled: bool,
    pub destination: String,
}

/// Enabled flag, destination and record sequence of a running agent.
///
/// The flag moves between Disabled and Enabled only through [`toggle`]
/// (control messages) and [`set_enabled`] (local configuration).
///
/// [`toggle`]: Session::toggle
/// [`set_enabled`]: Session::set_enabled
#[derive(Debug)]
pub struct Session {
    enabled: AtomicBool,
    initial: bool,
    destination: String,
    sequence: AtomicU64,
}

impl Session {
    #[must_use]
    pub fn new(initial: bool, destination: impl Into<String>) -> Self {
        Self {
            enabled: AtomicBool::new(initial),
            initial,
            destination: destination.into(),
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Flip the enabled flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    /// Set the enabled flag, returning whether it changed.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst) != enabled
    }

    /// Claim the next record sequence number (starting at 1).
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records produced since creation or the last reset.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            enabled: self.is_enabled(),
            destination: self.destination.clone(),
        }
    }

    /// Return to the state the session was created in.
    pub fn reset(&self) {
        self.enabled.store(self.initial, Ordering::SeqCst);
        self.sequence.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_round_trip() {
        let session = Session::new(false, "./logs/app.log");
        assert!(session.toggle());
        assert!(session.is_enabled());
        assert!(!session.toggle());
        assert!(!session.is_enabled());
    }

    #[test]
    fn test_set_enabled_reports_change() {
        let session = Session::new(true, "x");
        assert!(!session.set_enabled(true));
        assert!(session.set_enabled(false));
        assert!(!session.is_enabled());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let session = Session::new(true, "x");
        session.toggle();
        session.next_sequence();
        session.next_sequence();
        assert_eq!(session.produced(), 2);

        session.reset();

        assert!(session.is_enabled());
        assert_eq!(session.produced(), 0);
        assert_eq!(session.next_sequence(), 1);
    }
}
