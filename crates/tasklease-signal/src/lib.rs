//! # tasklease-signal
//!
//! Interrupt-safe hand-off between a lease timer interrupt and the recovery
//! coordinator that handles lease expiry.
//!
//! This crate is `#![no_std]` (with `alloc`) and provides:
//! - [`RecoverySignal`]: a sticky "expiry occurred" flag plus counters
//! - [`InterruptBridge`]: the only handle allowed in interrupt context
//! - [`SignalReceiver`]: the single consumer handle owned by the coordinator
//! - [`WakePrimitive`]: the wake half supplied by the host scheduler
//!
//! ## Interrupt-Context Guarantees
//!
//! [`InterruptBridge::on_expiry`] is the whole interrupt-context surface:
//! - **No heap allocations**
//! - **No logging, no formatting**
//! - **No locks** shared with normal context
//! - **Bounded execution**: two atomic RMW operations and one wake post
//!
//! The bridge carries only the fact that at least one expiry occurred.
//! Which unit expired is worked out later, in normal context, because that
//! needs string handling and table scans.
//!
//! ## Coalescing
//!
//! The flag is sticky and carries no count. Several expiries raised before the
//! consumer calls [`SignalReceiver::take`] are observed as one event; the
//! [`SignalMetrics::coalesced`] counter records how many were folded.
//!
//! ```text
//!            on_expiry()               take() == true
//!   Clear ───────────────► Pending ────────────────────► Clear
//!                            │  ▲
//!                            └──┘ on_expiry() (coalesced)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use tasklease_signal::prelude::*;
//!
//! struct NoWake;
//!
//! impl WakePrimitive for NoWake {
//!     fn wake_from_isr(&self) -> bool {
//!         false
//!     }
//! }
//!
//! let (bridge, receiver) = recovery_channel(NoWake);
//!
//! // Interrupt context
//! let outcome = bridge.on_expiry();
//! assert!(outcome.newly_pending);
//!
//! // Normal context
//! assert!(receiver.take());
//! assert!(!receiver.take());
//! ```

#![no_std]
#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod bridge;
pub mod prelude;
pub mod signal;

pub use bridge::{InterruptBridge, IsrOutcome, SignalReceiver, WakePrimitive, recovery_channel};
pub use signal::{RecoverySignal, SignalMetrics};
