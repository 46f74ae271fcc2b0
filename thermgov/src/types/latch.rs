//! A one-shot latch that closes once and stays closed.
//!
//! Used for safety decisions that must never be undone within a process
//! lifetime. Restarting the process is the only way back to `Open`.
//!
//! # State Machine
//!
//! ```text
//!          close()
//!  Open ────────────► PermanentlyClosed
//!                        │        ▲
//!                        └────────┘
//!                         close()
//! ```
//!
//! Reads and the transition are atomic, so the latch can be shared between
//! the control loop and request handlers without a lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Observable state of a [`OneShotLatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Open,
    PermanentlyClosed,
}

pub struct OneShotLatch {
    name: &'static str,
    closed: AtomicBool,
}

impl OneShotLatch {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            closed: AtomicBool::new(false),
        }
    }

    /// Close the latch.
    ///
    /// Returns `true` only for the call that performed the transition;
    /// later calls return `false` and change nothing.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LatchState {
        if self.is_closed() {
            LatchState::PermanentlyClosed
        } else {
            LatchState::Open
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for OneShotLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotLatch")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_open() {
        let latch = OneShotLatch::new("test");
        assert_eq!(latch.state(), LatchState::Open);
        assert!(!latch.is_closed());
    }

    #[test]
    fn first_close_reports_transition() {
        let latch = OneShotLatch::new("test");
        assert!(latch.close());
        assert_eq!(latch.state(), LatchState::PermanentlyClosed);
    }

    #[test]
    fn later_closes_are_noops() {
        let latch = OneShotLatch::new("test");
        latch.close();
        assert!(!latch.close());
        assert!(!latch.close());
        assert!(latch.is_closed());
    }

    #[test]
    fn exactly_one_concurrent_closer_wins() {
        let latch = Arc::new(OneShotLatch::new("test"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = latch.clone();
                std::thread::spawn(move || latch.close())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(latch.is_closed());
    }
}
