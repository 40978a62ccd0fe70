//! Error types for lease supervision.
//!
//! Registry misuse ([`SupervisorError::DuplicateName`],
//! [`SupervisorError::UnknownHandle`]) is returned to the caller and never
//! affects the rest of the process. Attribution failure is not an error at
//! all; it is an outcome the coordinator handles with its default action.
//! Recovery action failures are logged by the coordinator and dropped.

use thiserror::Error;

use crate::registry::UnitHandle;

/// Errors returned by the supervision core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// A unit with this name is already registered.
    #[error("Unit name already registered: {0}")]
    DuplicateName(String),

    /// The handle was never registered or has been unregistered.
    #[error("Unknown unit handle: {0}")]
    UnknownHandle(UnitHandle),

    /// The unit name cannot be attributed from a diagnostic report.
    #[error("Invalid unit name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The timer subsystem or coordinator could not be started.
    #[error("Timer subsystem initialization failed: {0}")]
    TimerInit(String),

    /// A background thread panicked.
    #[error("Background task panicked: {0}")]
    TaskPanicked(String),
}

impl SupervisorError {
    /// Create a duplicate name error.
    #[must_use]
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Create an invalid name error.
    #[must_use]
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Create a timer initialization error.
    #[must_use]
    pub fn timer_init(reason: impl Into<String>) -> Self {
        Self::TimerInit(reason.into())
    }
}

/// A specialized `Result` type for supervision operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Error reported by a [`RecoverySink`](crate::recovery::RecoverySink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Recovery sink {sink} failed: {reason}")]
pub struct SinkError {
    /// The sink that failed.
    pub sink: u32,
    /// Failure description.
    pub reason: String,
}

impl SinkError {
    /// Create a sink error.
    #[must_use]
    pub fn new(sink: u32, reason: impl Into<String>) -> Self {
        Self {
            sink,
            reason: reason.into(),
        }
    }
}

/// A dispatched recovery action did not complete its pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Recovery action for {target} stopped after {completed_toggles} toggles: {source}")]
pub struct RecoveryActionError {
    /// Unit name, or `"<default>"` for the unattributed action.
    pub target: String,
    /// Toggles completed before the failure.
    pub completed_toggles: u32,
    /// The sink failure that stopped the action.
    #[source]
    pub source: SinkError,
}
