//! Thread wake primitive for the recovery channel.
//!
//! The interrupt side holds a [`ParkerWake`]; the coordinator thread owns the
//! matching [`SignalWaiter`]. A wake posted before the coordinator parks is
//! kept as a token, so the next wait returns immediately.

use crossbeam::sync::{Parker, Unparker};
use std::time::Duration;
use tasklease_signal::WakePrimitive;

/// Interrupt-side wake backed by a crossbeam [`Unparker`].
#[derive(Debug, Clone)]
pub struct ParkerWake {
    unparker: Unparker,
}

impl WakePrimitive for ParkerWake {
    fn wake_from_isr(&self) -> bool {
        self.unparker.unpark();
        true
    }
}

/// Coordinator-side wait, backed by a crossbeam [`Parker`].
#[derive(Debug)]
pub struct SignalWaiter {
    parker: Parker,
}

impl SignalWaiter {
    /// Block until woken, or until `timeout` elapses.
    ///
    /// May return early without a wake; callers treat that as spurious.
    pub fn wait(&self, timeout: Option<Duration>) {
        match timeout {
            Some(timeout) => self.parker.park_timeout(timeout),
            None => self.parker.park(),
        }
    }
}

/// Create a connected wake/wait pair.
#[must_use]
pub fn wake_pair() -> (ParkerWake, SignalWaiter) {
    let parker = Parker::new();
    let wake = ParkerWake {
        unparker: parker.unparker().clone(),
    };
    (wake, SignalWaiter { parker })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_wake_before_wait_is_not_lost() {
        let (wake, waiter) = wake_pair();
        assert!(wake.wake_from_isr());

        let start = Instant::now();
        waiter.wait(Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_bounded_wait_returns_without_wake() {
        let (_wake, waiter) = wake_pair();
        let start = Instant::now();
        waiter.wait(Some(Duration::from_millis(20)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_cross_thread_wake() {
        let (wake, waiter) = wake_pair();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            wake.wake_from_isr()
        });
        waiter.wait(Some(Duration::from_secs(5)));
        assert!(handle.join().unwrap_or(false));
    }
}
