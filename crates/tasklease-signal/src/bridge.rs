//! Single-producer, single-consumer expiry channel.
//!
//! [`recovery_channel`] splits one [`RecoverySignal`] into two handles with
//! disjoint capabilities:
//!
//! - [`InterruptBridge`] can only raise the flag and post a wake. It is the
//!   value handed to the timer subsystem's interrupt registration.
//! - [`SignalReceiver`] can only observe and clear the flag. It belongs to the
//!   recovery coordinator.
//!
//! Neither handle is `Clone`, so there is exactly one producer and one
//! consumer per channel.

use alloc::sync::Arc;

use crate::signal::{RecoverySignal, SignalMetrics};

/// Wake half of the channel, supplied by the host scheduler.
///
/// Implementations are called from interrupt context. They must not allocate,
/// log, block, or take a lock that normal context can hold for an unbounded
/// time.
pub trait WakePrimitive: Send + Sync {
    /// Post a wake to the consumer task.
    ///
    /// Returns `true` when the wake may have unblocked a task that should run
    /// before the interrupted one (the caller then requests a deferred
    /// context switch).
    fn wake_from_isr(&self) -> bool;
}

impl<W: WakePrimitive + ?Sized> WakePrimitive for Arc<W> {
    fn wake_from_isr(&self) -> bool {
        (**self).wake_from_isr()
    }
}

impl<W: WakePrimitive + ?Sized> WakePrimitive for &W {
    fn wake_from_isr(&self) -> bool {
        (**self).wake_from_isr()
    }
}

/// Result of one interrupt-context raise.
#[must_use = "a requested context switch must be honoured by the interrupt epilogue"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsrOutcome {
    /// The flag went from clear to set with this raise.
    pub newly_pending: bool,
    /// The wake asked for a deferred context switch.
    pub yield_requested: bool,
}

/// Interrupt-context handle of the recovery channel.
///
/// [`InterruptBridge::on_expiry`] is its only operation.
#[derive(Debug)]
pub struct InterruptBridge<W: WakePrimitive> {
    signal: Arc<RecoverySignal>,
    wake: W,
}

impl<W: WakePrimitive> InterruptBridge<W> {
    /// Record that at least one lease deadline elapsed and wake the consumer.
    ///
    /// # Real-Time Safety
    ///
    /// Safe to call from interrupt context: one atomic swap, up to two
    /// relaxed counter increments, one wake post.
    pub fn on_expiry(&self) -> IsrOutcome {
        let newly_pending = self.signal.raise();
        let yield_requested = self.wake.wake_from_isr();
        IsrOutcome {
            newly_pending,
            yield_requested,
        }
    }
}

/// Consumer handle of the recovery channel.
#[derive(Debug)]
pub struct SignalReceiver {
    signal: Arc<RecoverySignal>,
}

impl SignalReceiver {
    /// Atomically consume and clear the expiry flag.
    ///
    /// Returns `false` on a spurious wake.
    pub fn take(&self) -> bool {
        self.signal.take()
    }

    /// Check the flag without clearing it.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.signal.is_pending()
    }

    /// Counter snapshot of the underlying signal.
    #[must_use]
    pub fn metrics(&self) -> SignalMetrics {
        self.signal.metrics()
    }
}

/// Create a recovery channel around `wake`.
///
/// The returned [`InterruptBridge`] goes to the timer subsystem; the
/// [`SignalReceiver`] goes to the recovery coordinator.
#[must_use]
pub fn recovery_channel<W: WakePrimitive>(wake: W) -> (InterruptBridge<W>, SignalReceiver) {
    let signal = Arc::new(RecoverySignal::new());
    let bridge = InterruptBridge {
        signal: Arc::clone(&signal),
        wake,
    };
    (bridge, SignalReceiver { signal })
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct CountingWake {
        wakes: AtomicU32,
    }

    impl WakePrimitive for CountingWake {
        fn wake_from_isr(&self) -> bool {
            self.wakes.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    #[test]
    fn test_trait_bounds() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn WakePrimitive>();
        assert_send_sync::<InterruptBridge<CountingWake>>();
        assert_send_sync::<SignalReceiver>();
    }

    #[test]
    fn test_on_expiry_sets_flag_and_wakes() {
        let wake = Arc::new(CountingWake::default());
        let (bridge, receiver) = recovery_channel(Arc::clone(&wake));

        let outcome = bridge.on_expiry();
        assert!(outcome.newly_pending);
        assert!(outcome.yield_requested);
        assert!(receiver.is_pending());
        assert_eq!(wake.wakes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_every_raise_posts_a_wake() {
        let wake = Arc::new(CountingWake::default());
        let (bridge, receiver) = recovery_channel(Arc::clone(&wake));

        let first = bridge.on_expiry();
        let second = bridge.on_expiry();
        assert!(first.newly_pending);
        assert!(!second.newly_pending);
        assert_eq!(wake.wakes.load(Ordering::Relaxed), 2);

        assert!(receiver.take());
        assert!(!receiver.take());
        assert_eq!(receiver.metrics().coalesced, 1);
    }

    #[test]
    fn test_borrowed_wake() {
        let wake = CountingWake::default();
        let (bridge, receiver) = recovery_channel(&wake);
        let outcome = bridge.on_expiry();
        assert!(outcome.newly_pending);
        assert!(receiver.take());
        assert_eq!(wake.wakes.load(Ordering::Relaxed), 1);
    }
}
