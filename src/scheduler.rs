//! Debounced refresh scheduling.
//!
//! Rapid settings edits (slider drags) should not re-render the whole batch on
//! every intermediate value. The scheduler holds a single pending slot:
//! scheduling again replaces the pending pass, so only the last one scheduled
//! within the debounce window runs.

use std::time::{Duration, Instant};

/// Default delay between the last edit and the refresh.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A single-slot debounce queue driven by caller-supplied instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshScheduler {
    delay: Duration,
    pending: Option<Instant>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl RefreshScheduler {
    /// A scheduler waiting `delay` after the last request.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// The debounce delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Request a refresh at `now + delay`, replacing any pending request.
    pub fn schedule(&mut self, now: Instant) {
        self.pending = Some(now + self.delay);
    }

    /// When the pending refresh becomes due, if one is pending.
    #[must_use]
    pub fn due_at(&self) -> Option<Instant> {
        self.pending
    }

    /// Whether a refresh is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume the pending refresh if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(due) if now >= due => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending refresh, e.g. because an immediate pass superseded it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
