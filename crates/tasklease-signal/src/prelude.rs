//! Prelude for tasklease-signal.
//!
//! This module re-exports the most commonly used types for convenient importing.

pub use crate::bridge::{InterruptBridge, IsrOutcome, SignalReceiver, WakePrimitive, recovery_channel};
pub use crate::signal::{RecoverySignal, SignalMetrics};
