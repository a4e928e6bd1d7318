//! Quiet-period debouncing of search changes.

use std::time::Duration;

use tokio::time::Instant;

/// Debouncer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Nothing pending.
    Idle,
    /// A change is waiting for its quiet period to pass.
    PendingQuiet { deadline: Instant },
}

/// Coalesces bursts of changes into a single recompute.
///
/// Each change re-arms the deadline, discarding the previous one. The owner
/// sleeps until [`deadline`](Self::deadline) and then calls
/// [`fire`](Self::fire), which reports at most one expiry per burst.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    state: DebounceState,
}

impl Debouncer {
    /// Create an idle debouncer with the given quiet period.
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            state: DebounceState::Idle,
        }
    }

    /// Configured quiet period.
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DebounceState {
        self.state
    }

    /// Whether a change is waiting.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::PendingQuiet { .. })
    }

    /// Record a change that should apply after the quiet period.
    pub fn on_quiet_change(&mut self, now: Instant) {
        self.on_change(now, self.quiet);
    }

    /// Record a change that should apply after `delay`. The latest change
    /// replaces any armed deadline.
    pub fn on_change(&mut self, now: Instant, delay: Duration) {
        self.state = DebounceState::PendingQuiet {
            deadline: now + delay,
        };
    }

    /// Deadline of the pending change, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::PendingQuiet { deadline } => Some(deadline),
        }
    }

    /// Return to idle and report `true` if the pending deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::PendingQuiet { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }
}
