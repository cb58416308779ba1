//! Idle policy for the process-level store lock.
//!
//! The actor holds the store lock by default. Once it has been idle past the
//! release deadline it gives the lock up for the rest of the idle period, and
//! the deadline moves to `interval` after the lock comes back. The policy only
//! keeps time; the actual release happens in the store's long running
//! operation, so it can be driven with synthetic instants in tests.

use std::time::{Duration, Instant};

/// Whether the actor currently holds the store lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Held,
    Released { since: Instant },
}

#[derive(Debug, Clone)]
pub struct UnlockPolicy {
    interval: Duration,
    /// `None` when the interval is too long to represent as an instant.
    next_release: Option<Instant>,
    state: LockState,
    release_count: u64,
}

impl UnlockPolicy {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_release: now.checked_add(interval),
            state: LockState::Held,
            release_count: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When an idle actor should next give up the lock, if ever.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_release
    }

    pub fn is_release_due(&self, now: Instant) -> bool {
        self.state == LockState::Held && self.next_release.is_some_and(|deadline| now >= deadline)
    }

    pub fn on_release(&mut self, now: Instant) {
        self.state = LockState::Released { since: now };
        self.release_count += 1;
    }

    /// Record that the lock is back; returns how long it was given up.
    pub fn on_reacquire(&mut self, now: Instant) -> Duration {
        let released_for = match self.state {
            LockState::Released { since } => now.saturating_duration_since(since),
            LockState::Held => Duration::ZERO,
        };
        self.state = LockState::Held;
        self.next_release = now.checked_add(self.interval);
        released_for
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    pub fn release_count(&self) -> u64 {
        self.release_count
    }
}
