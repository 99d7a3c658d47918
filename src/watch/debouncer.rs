//! Coalescing of raw change events into delayed notifications.
//!
//! The window is anchored at the first event of a burst: further events
//! while a notification is pending neither reschedule nor extend it.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    /// When the pending notification is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline } => Some(deadline),
        }
    }

    /// Records a raw event at `now`.
    ///
    /// Returns `true` if this event scheduled a new notification, `false`
    /// if it was absorbed by one already pending.
    pub fn trigger(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Idle => {
                self.state = DebounceState::Pending {
                    deadline: now + self.window,
                };
                true
            }
            DebounceState::Pending { .. } => false,
        }
    }

    /// Returns `true` (and goes idle) if a pending notification is due at `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Pending { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drops a pending notification without delivering it.
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.is_pending();
        self.state = DebounceState::Idle;
        was_pending
    }
}

/// Sleeps until `deadline`, or forever when nothing is scheduled.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
