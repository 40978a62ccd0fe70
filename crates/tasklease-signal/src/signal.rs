//! Sticky expiry flag and its counters.
//!
//! [`RecoverySignal`] is the only state shared between interrupt context and
//! normal context. Every access goes through a single atomic operation.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Sticky expiry flag shared by one producer and one consumer.
///
/// Once raised the flag stays set until the consumer clears it with
/// [`RecoverySignal::take`]. No expiry raised between a set and the next
/// observation is lost; multiple raises before that observation coalesce.
///
/// # Real-Time Safety
///
/// All methods are lock-free, allocation-free and bounded.
#[derive(Debug)]
pub struct RecoverySignal {
    /// The sticky "expiry occurred" flag.
    pending: AtomicBool,
    /// Number of raises, including coalesced ones.
    raised: AtomicU32,
    /// Number of raises that found the flag already set.
    coalesced: AtomicU32,
    /// Number of `take` calls that consumed a pending flag.
    consumed: AtomicU32,
    /// Number of `take` calls that found the flag clear.
    spurious: AtomicU32,
}

impl RecoverySignal {
    /// Create a cleared signal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            raised: AtomicU32::new(0),
            coalesced: AtomicU32::new(0),
            consumed: AtomicU32::new(0),
            spurious: AtomicU32::new(0),
        }
    }

    /// Set the flag.
    ///
    /// Returns `true` if the flag transitioned from clear to set, `false` if
    /// this raise was folded into one that has not been consumed yet.
    ///
    /// The `Release` half of the swap makes the set visible to the consumer
    /// before any wake posted afterwards completes.
    pub(crate) fn raise(&self) -> bool {
        let was_pending = self.pending.swap(true, Ordering::AcqRel);
        self.raised.fetch_add(1, Ordering::Relaxed);
        if was_pending {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        !was_pending
    }

    /// Atomically consume and clear the flag.
    ///
    /// Returns `true` if an expiry was pending. A `false` return is a
    /// spurious wake and is counted as such.
    pub fn take(&self) -> bool {
        let was_pending = self.pending.swap(false, Ordering::AcqRel);
        if was_pending {
            self.consumed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.spurious.fetch_add(1, Ordering::Relaxed);
        }
        was_pending
    }

    /// Check the flag without consuming it.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> SignalMetrics {
        SignalMetrics {
            raised: self.raised.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            spurious: self.spurious.load(Ordering::Relaxed),
            pending: self.is_pending(),
        }
    }
}

impl Default for RecoverySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter snapshot returned by [`RecoverySignal::metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalMetrics {
    /// Total raises from interrupt context.
    pub raised: u32,
    /// Raises that found the flag already pending.
    pub coalesced: u32,
    /// Pending flags consumed by `take`.
    pub consumed: u32,
    /// Consumer checks that found nothing pending.
    pub spurious: u32,
    /// Whether the flag is currently set.
    pub pending: bool,
}

impl SignalMetrics {
    /// Raises that became distinct observations (`raised - coalesced`).
    #[must_use]
    pub fn distinct_raises(&self) -> u32 {
        self.raised.saturating_sub(self.coalesced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_signal_is_clear() {
        let signal = RecoverySignal::new();
        assert!(!signal.is_pending());
        assert_eq!(signal.metrics(), SignalMetrics::default());
    }

    #[test]
    fn test_raise_is_sticky_until_taken() {
        let signal = RecoverySignal::new();
        assert!(signal.raise());
        assert!(signal.is_pending());
        assert!(signal.is_pending());

        assert!(signal.take());
        assert!(!signal.is_pending());
    }

    #[test]
    fn test_second_raise_coalesces() {
        let signal = RecoverySignal::new();
        assert!(signal.raise());
        assert!(!signal.raise());

        let metrics = signal.metrics();
        assert_eq!(metrics.raised, 2);
        assert_eq!(metrics.coalesced, 1);
        assert_eq!(metrics.distinct_raises(), 1);

        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn test_take_on_clear_counts_spurious() {
        let signal = RecoverySignal::new();
        assert!(!signal.take());
        assert!(!signal.take());

        let metrics = signal.metrics();
        assert_eq!(metrics.spurious, 2);
        assert_eq!(metrics.consumed, 0);
    }

    #[test]
    fn test_raise_after_take_is_new_event() {
        let signal = RecoverySignal::new();
        assert!(signal.raise());
        assert!(signal.take());
        assert!(signal.raise());

        let metrics = signal.metrics();
        assert_eq!(metrics.consumed, 1);
        assert_eq!(metrics.coalesced, 0);
        assert!(metrics.pending);
    }
}
