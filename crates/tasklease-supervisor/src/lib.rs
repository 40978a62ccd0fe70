//! # tasklease-supervisor
//!
//! Lease-based liveness supervision for cooperative worker units, with
//! attributed recovery.
//!
//! Each monitored unit renews a lease before its deadline. When a lease
//! expires, the timer subsystem fires an interrupt-safe bridge that wakes the
//! recovery coordinator. The coordinator works out which unit missed its
//! deadline and runs that unit's recovery action.
//!
//! ## Architecture
//!
//! - [`registry`] - Lease table: registration, renewal, expiry scans
//! - [`diagnostic`] - Diagnostic snapshots and the line-report attributor
//! - [`recovery`] - Recovery actions, the immutable action table, sinks
//! - [`coordinator`] - The `Idle → Signaled → Diagnosing → Dispatching` loop
//! - [`timer`] - Software timer subsystem and registry-backed diagnostics
//! - [`harness`] - Scheduled worker loops that renew (or skip) their lease
//! - [`supervisor`] - Bring-up of all of the above on background threads
//! - [`config`] - Supervisor configuration
//! - [`clock`] - Monotonic and manual time sources
//! - [`error`] - Error types
//!
//! The interrupt-context half lives in the `tasklease-signal` crate.
//!
//! ## Failure Handling
//!
//! - Lease expiry is the trigger the coordinator exists for, never an error.
//!   `panic_on_expiry` is rejected by configuration validation.
//! - Attribution failure falls back to the default recovery action.
//! - Recovery action failures are logged and counted; the coordinator always
//!   returns to `Idle`.
//! - Only configuration errors and thread spawn failures at startup are fatal.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tasklease_supervisor::prelude::*;
//! use tasklease_supervisor::recovery_channel;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(ManualClock::new());
//! let registry = Arc::new(LeaseRegistry::new(Duration::from_millis(5000), clock.clone())?);
//! let handle = registry.register("test_user")?;
//!
//! let table = RecoveryTable::builder()
//!     .action("test_user", RecoveryAction::new(2, TogglePattern::new(3, Duration::ZERO)))
//!     .build()?;
//! let sink = Arc::new(RecordingSink::new());
//!
//! let (wake, waiter) = wake_pair();
//! let (bridge, receiver) = recovery_channel(wake);
//! let timer = SoftwareTimer::new(bridge, Arc::clone(&registry));
//! let mut coordinator = RecoveryCoordinator::new(
//!     receiver,
//!     waiter,
//!     RegistryDiagnostics::new(Arc::clone(&registry), 1),
//!     Arc::new(table),
//!     Arc::clone(&sink),
//!     CoordinatorOptions::default(),
//! );
//!
//! registry.renew(handle)?;
//! clock.advance(Duration::from_millis(5001));
//! assert!(timer.poll().is_some());
//!
//! match coordinator.run_cycle() {
//!     CycleOutcome::Recovered(report) => {
//!         assert_eq!(report.attribution.name.as_deref(), Some("test_user"));
//!     }
//!     CycleOutcome::Spurious => return Err("expected a recovery cycle".into()),
//! }
//! assert_eq!(sink.transitions_for(2).len(), 6);
//! assert_eq!(coordinator.state(), CoordinatorState::Idle);
//! # Ok(())
//! # }
//! ```

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

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod diagnostic;
pub mod error;
pub mod harness;
pub mod recovery;
pub mod registry;
pub mod supervisor;
pub mod task;
pub mod timer;
pub mod wake;

pub mod prelude;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{DiagnosticMode, DispatchPolicy, SupervisorConfig, SupervisorConfigBuilder};
pub use coordinator::{
    CoordinatorMetrics, CoordinatorMetricsSnapshot, CoordinatorObserver, CoordinatorOptions,
    CoordinatorState, CycleOutcome, CycleReport, DispatchRecord, RecoveryCoordinator,
};
pub use diagnostic::{
    AttributionResult, CoreEntry, DiagnosticAttributor, DiagnosticSnapshot, DiagnosticSource,
    UnitName,
};
pub use error::{RecoveryActionError, SinkError, SupervisorError, SupervisorResult};
pub use harness::{RenewalSchedule, Step, UnitWorker};
pub use recovery::{
    DefaultActionSpec, RecordingSink, RecoveryAction, RecoveryActionSpec, RecoverySink,
    RecoveryTable, RecoveryTableBuilder, RecoveryTableSpec, TogglePattern, TracingSink,
    Transition,
};
pub use registry::{
    LeaseOptions, LeaseRegistry, LeaseStatus, MAX_UNIT_NAME_LEN, MonitoredUnit, UNIT_NAME_CAPACITY,
    UnitHandle,
};
pub use supervisor::Supervisor;
pub use task::BackgroundTask;
pub use timer::{RegistryDiagnostics, SoftwareTimer};
pub use wake::{ParkerWake, SignalWaiter, wake_pair};

pub use tasklease_signal::{
    InterruptBridge, IsrOutcome, SignalMetrics, SignalReceiver, WakePrimitive, recovery_channel,
};
