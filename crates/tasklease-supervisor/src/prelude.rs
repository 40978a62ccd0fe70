//! Prelude for tasklease-supervisor.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tasklease_supervisor::prelude::*;
//!
//! let registry = LeaseRegistry::with_monotonic_clock(Duration::from_secs(5))?;
//! let handle = registry.register("test_user")?;
//! registry.renew(handle)?;
//! assert_eq!(registry.handle_of("test_user"), Some(handle));
//! # Ok::<(), SupervisorError>(())
//! ```

pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::config::{DiagnosticMode, DispatchPolicy, SupervisorConfig};
pub use crate::coordinator::{
    CoordinatorOptions, CoordinatorState, CycleOutcome, CycleReport, RecoveryCoordinator,
};
pub use crate::diagnostic::{AttributionResult, DiagnosticAttributor, DiagnosticSnapshot, DiagnosticSource};
pub use crate::error::{SupervisorError, SupervisorResult};
pub use crate::harness::{RenewalSchedule, Step, UnitWorker};
pub use crate::recovery::{
    RecordingSink, RecoveryAction, RecoverySink, RecoveryTable, TogglePattern, TracingSink,
};
pub use crate::registry::{LeaseOptions, LeaseRegistry, MonitoredUnit, UnitHandle};
pub use crate::supervisor::Supervisor;
pub use crate::timer::{RegistryDiagnostics, SoftwareTimer};
pub use crate::wake::wake_pair;
