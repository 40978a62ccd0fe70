//! Recovery actions, the immutable action table and recovery sinks.
//!
//! A recovery action drives one binary sink through a fixed on/off pattern.
//! The table mapping unit names to actions is built once at startup and
//! shared read-only afterwards.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RecoveryActionError, SinkError, SupervisorError, SupervisorResult};

/// Target label used for the unattributed action.
pub const DEFAULT_TARGET: &str = "<default>";

/// Abstract binary output driven by recovery actions.
///
/// Called from the coordinator's normal context only.
pub trait RecoverySink: Send + Sync + fmt::Debug {
    /// Drive `sink` high (`on`) or low.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the output could not be driven.
    fn set_level(&self, sink: u32, on: bool) -> Result<(), SinkError>;
}

impl<S: RecoverySink + ?Sized> RecoverySink for Arc<S> {
    fn set_level(&self, sink: u32, on: bool) -> Result<(), SinkError> {
        (**self).set_level(sink, on)
    }
}

/// Fixed-count, fixed-interval on/off pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TogglePattern {
    /// Number of on/off cycles.
    pub toggles: u32,
    /// Hold time after each transition.
    pub interval: Duration,
}

impl TogglePattern {
    /// Create a pattern.
    #[must_use]
    pub const fn new(toggles: u32, interval: Duration) -> Self {
        Self { toggles, interval }
    }

    /// Ten cycles at 100ms, the status-LED blink.
    #[must_use]
    pub const fn status_blink() -> Self {
        Self::new(10, Duration::from_millis(100))
    }

    /// Total time the pattern holds the coordinator.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.interval.saturating_mul(self.toggles.saturating_mul(2))
    }
}

/// A recovery routine bound to one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryAction {
    /// Sink driven by the action.
    pub sink: u32,
    /// Pattern to play on the sink.
    pub pattern: TogglePattern,
}

impl RecoveryAction {
    /// Create an action.
    #[must_use]
    pub const fn new(sink: u32, pattern: TogglePattern) -> Self {
        Self { sink, pattern }
    }

    /// Play the pattern on `output`, blocking for its duration.
    ///
    /// On failure the sink is driven low on a best-effort basis and the
    /// remaining toggles are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryActionError`] when the sink rejects a transition.
    pub fn execute(&self, output: &dyn RecoverySink, target: &str) -> Result<(), RecoveryActionError> {
        for completed in 0..self.pattern.toggles {
            for level in [true, false] {
                if let Err(source) = output.set_level(self.sink, level) {
                    if level && output.set_level(self.sink, false).is_err() {
                        tracing::debug!(sink = self.sink, "Recovery sink could not be driven low");
                    }
                    return Err(RecoveryActionError {
                        target: target.to_string(),
                        completed_toggles: completed,
                        source,
                    });
                }
                if !self.pattern.interval.is_zero() {
                    std::thread::sleep(self.pattern.interval);
                }
            }
        }
        Ok(())
    }
}

/// Immutable mapping from unit name to recovery action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryTable {
    actions: HashMap<String, RecoveryAction>,
    default_action: Option<RecoveryAction>,
}

impl RecoveryTable {
    /// Start building a table.
    #[must_use]
    pub fn builder() -> RecoveryTableBuilder {
        RecoveryTableBuilder::default()
    }

    /// Action configured for `unit`.
    #[must_use]
    pub fn lookup(&self, unit: &str) -> Option<&RecoveryAction> {
        self.actions.get(unit)
    }

    /// Action for unattributed or unmapped expiries.
    #[must_use]
    pub fn default_action(&self) -> Option<&RecoveryAction> {
        self.default_action.as_ref()
    }

    /// Number of unit-specific actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no unit-specific action is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Builder for [`RecoveryTable`].
#[derive(Debug, Default)]
pub struct RecoveryTableBuilder {
    actions: Vec<(String, RecoveryAction)>,
    default_action: Option<RecoveryAction>,
}

impl RecoveryTableBuilder {
    /// Map `unit` to `action`.
    #[must_use]
    pub fn action(mut self, unit: impl Into<String>, action: RecoveryAction) -> Self {
        self.actions.push((unit.into(), action));
        self
    }

    /// Set the fallback action.
    #[must_use]
    pub fn default_action(mut self, action: RecoveryAction) -> Self {
        self.default_action = Some(action);
        self
    }

    /// Freeze the table.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit is mapped twice.
    pub fn build(self) -> SupervisorResult<RecoveryTable> {
        let mut actions = HashMap::with_capacity(self.actions.len());
        for (unit, action) in self.actions {
            if actions.contains_key(&unit) {
                return Err(SupervisorError::invalid_configuration(format!(
                    "recovery action for '{unit}' configured twice"
                )));
            }
            actions.insert(unit, action);
        }
        Ok(RecoveryTable {
            actions,
            default_action: self.default_action,
        })
    }
}

/// Serialized form of one unit's recovery action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryActionSpec {
    /// Unit name the action applies to.
    pub unit: String,
    /// Sink index.
    pub sink: u32,
    /// On/off cycles.
    #[serde(default = "default_toggles")]
    pub toggles: u32,
    /// Hold time per transition in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Serialized form of the fallback action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultActionSpec {
    /// Sink index.
    pub sink: u32,
    /// On/off cycles.
    #[serde(default = "default_toggles")]
    pub toggles: u32,
    /// Hold time per transition in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Serialized form of a [`RecoveryTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryTableSpec {
    /// Unit-specific actions.
    #[serde(default)]
    pub actions: Vec<RecoveryActionSpec>,
    /// Fallback action.
    #[serde(default)]
    pub default_action: Option<DefaultActionSpec>,
}

impl RecoveryTableSpec {
    /// Build the immutable table.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit is mapped twice.
    pub fn into_table(self) -> SupervisorResult<RecoveryTable> {
        let mut builder = RecoveryTable::builder();
        for spec in self.actions {
            let action = RecoveryAction::new(
                spec.sink,
                TogglePattern::new(spec.toggles, Duration::from_millis(spec.interval_ms)),
            );
            builder = builder.action(spec.unit, action);
        }
        if let Some(spec) = self.default_action {
            builder = builder.default_action(RecoveryAction::new(
                spec.sink,
                TogglePattern::new(spec.toggles, Duration::from_millis(spec.interval_ms)),
            ));
        }
        builder.build()
    }
}

fn default_toggles() -> u32 {
    TogglePattern::status_blink().toggles
}

fn default_interval_ms() -> u64 {
    100
}

/// Sink that logs every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RecoverySink for TracingSink {
    fn set_level(&self, sink: u32, on: bool) -> Result<(), SinkError> {
        tracing::debug!(sink = sink, level = u8::from(on), "Recovery sink level set");
        Ok(())
    }
}

/// One recorded sink transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Sink index.
    pub sink: u32,
    /// Level driven.
    pub on: bool,
}

/// Sink that records transitions, for tests and simulations.
#[derive(Debug, Default)]
pub struct RecordingSink {
    transitions: Mutex<Vec<Transition>>,
    failing: Mutex<HashSet<u32>>,
}

impl RecordingSink {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transition on `sink` fail from now on.
    pub fn fail_sink(&self, sink: u32) {
        self.failing.lock().insert(sink);
    }

    /// Let `sink` succeed again.
    pub fn heal_sink(&self, sink: u32) {
        self.failing.lock().remove(&sink);
    }

    /// All successful transitions in order.
    #[must_use]
    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions.lock().clone()
    }

    /// Successful transitions on one sink.
    #[must_use]
    pub fn transitions_for(&self, sink: u32) -> Vec<Transition> {
        self.transitions
            .lock()
            .iter()
            .filter(|t| t.sink == sink)
            .copied()
            .collect()
    }

    /// Forget recorded transitions.
    pub fn clear(&self) {
        self.transitions.lock().clear();
    }
}

impl RecoverySink for RecordingSink {
    fn set_level(&self, sink: u32, on: bool) -> Result<(), SinkError> {
        if self.failing.lock().contains(&sink) {
            return Err(SinkError::new(sink, "sink configured to fail"));
        }
        self.transitions.lock().push(Transition { sink, on });
        Ok(())
    }
}
