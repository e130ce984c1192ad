//! Single pending deadline for coalescing bursts of local changes.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks at most one pending flush deadline.
///
/// Arming again before the deadline pushes it out, so a burst of mutations
/// produces one write `delay` after the last of them.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Creates an idle debouncer.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Returns the quiet period.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms (or re-arms) the deadline relative to `now`.
    pub fn arm_at(&mut self, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    /// Arms (or re-arms) the deadline relative to the current instant.
    pub fn arm(&mut self) -> Instant {
        self.arm_at(Instant::now())
    }

    /// Arms only if nothing is pending, leaving an existing deadline alone.
    pub fn arm_if_idle(&mut self) {
        if self.deadline.is_none() {
            self.arm();
        }
    }

    /// Drops the pending deadline.
    pub const fn clear(&mut self) {
        self.deadline = None;
    }

    /// Returns the pending deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if a deadline is pending.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` if a deadline is pending and has passed at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}
