//! Recovery coordinator state machine.
//!
//! ```text
//! Idle ──wake──► Signaled ──flag set──► Diagnosing ──► Dispatching ──► Idle
//!                   │
//!                   └──flag clear (spurious)──────────────────────────► Idle
//! ```
//!
//! There is no terminal state. Every path returns to `Idle`, including a
//! failed recovery action.
//!
//! # Coalescing
//!
//! Expiries raised while a cycle is in progress set the sticky flag again and
//! are handled by the next cycle. That cycle queries diagnostics afresh, so
//! its attribution reflects whatever the timer subsystem reports at that
//! moment, which may already differ from the state that raised the flag.
//! Discrete events are never queued.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tasklease_signal::SignalReceiver;

use crate::config::{DiagnosticMode, DispatchPolicy, SupervisorConfig};
use crate::diagnostic::{AttributionResult, DiagnosticAttributor, DiagnosticSource, UnitName};
use crate::error::RecoveryActionError;
use crate::recovery::{DEFAULT_TARGET, RecoveryAction, RecoverySink, RecoveryTable};
use crate::wake::SignalWaiter;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum CoordinatorState {
    /// Waiting for a wake.
    #[default]
    Idle = 0,
    /// Woken; consuming the flag.
    Signaled = 1,
    /// Querying and attributing diagnostics.
    Diagnosing = 2,
    /// Running recovery actions.
    Dispatching = 3,
}

impl CoordinatorState {
    /// Convert from the raw representation.
    #[must_use]
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Signaled),
            2 => Some(Self::Diagnosing),
            3 => Some(Self::Dispatching),
            _ => None,
        }
    }

    /// Raw representation.
    #[must_use]
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Signaled => "Signaled",
            Self::Diagnosing => "Diagnosing",
            Self::Dispatching => "Dispatching",
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinator counters.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    cycles: AtomicU64,
    spurious_wakes: AtomicU64,
    attributed_cycles: AtomicU64,
    fallback_cycles: AtomicU64,
    actions_run: AtomicU64,
    action_failures: AtomicU64,
}

impl CoordinatorMetrics {
    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> CoordinatorMetricsSnapshot {
        CoordinatorMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            spurious_wakes: self.spurious_wakes.load(Ordering::Relaxed),
            attributed_cycles: self.attributed_cycles.load(Ordering::Relaxed),
            fallback_cycles: self.fallback_cycles.load(Ordering::Relaxed),
            actions_run: self.actions_run.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of [`CoordinatorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorMetricsSnapshot {
    /// Completed recovery cycles.
    pub cycles: u64,
    /// Wakes that found the flag clear.
    pub spurious_wakes: u64,
    /// Cycles whose diagnostics named at least one unit.
    pub attributed_cycles: u64,
    /// Cycles that fell back to the default action.
    pub fallback_cycles: u64,
    /// Recovery actions executed.
    pub actions_run: u64,
    /// Recovery actions that failed.
    pub action_failures: u64,
}

#[derive(Debug, Default)]
struct SharedStatus {
    state: AtomicU8,
    metrics: CoordinatorMetrics,
}

/// Read-only view of a running coordinator, usable from any thread.
#[derive(Debug, Clone)]
pub struct CoordinatorObserver {
    shared: Arc<SharedStatus>,
}

impl CoordinatorObserver {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_raw(self.shared.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> CoordinatorMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

/// Coordinator tuning derived from [`SupervisorConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Bound on the idle wait; `None` waits forever.
    pub wait_timeout: Option<Duration>,
    /// Debounce after each recovery cycle.
    pub post_cycle_delay: Option<Duration>,
    /// Dispatch policy.
    pub dispatch_policy: DispatchPolicy,
    /// Diagnostic form to request.
    pub diagnostic_mode: DiagnosticMode,
}

impl CoordinatorOptions {
    /// Options from a supervisor configuration.
    #[must_use]
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            wait_timeout: config.wait_timeout(),
            post_cycle_delay: config.post_cycle_delay(),
            dispatch_policy: config.dispatch_policy,
            diagnostic_mode: config.diagnostic_mode,
        }
    }
}

/// One executed recovery action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Unit name, or [`DEFAULT_TARGET`].
    pub target: String,
    /// The action that ran.
    pub action: RecoveryAction,
    /// Failure, if the action did not complete.
    pub error: Option<RecoveryActionError>,
}

/// What one recovery cycle observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Attribution of this cycle's diagnostics.
    pub attribution: AttributionResult,
    /// Actions executed, in order.
    pub dispatched: Vec<DispatchRecord>,
}

impl CycleReport {
    /// Whether the cycle fell back to the default action.
    #[must_use]
    pub fn used_default(&self) -> bool {
        self.dispatched.iter().any(|r| r.target == DEFAULT_TARGET)
    }
}

/// Result of one pass through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Woken with the flag clear; nothing was done.
    Spurious,
    /// A recovery cycle ran.
    Recovered(CycleReport),
}

/// Normal-context consumer of the recovery channel.
///
/// Owns the [`SignalReceiver`] and the wait primitive, so only one
/// coordinator can exist per channel.
pub struct RecoveryCoordinator<D, S> {
    receiver: SignalReceiver,
    waiter: SignalWaiter,
    source: D,
    table: Arc<RecoveryTable>,
    sink: S,
    attributor: DiagnosticAttributor,
    options: CoordinatorOptions,
    shared: Arc<SharedStatus>,
}

impl<D: DiagnosticSource, S: RecoverySink> RecoveryCoordinator<D, S> {
    /// Create a coordinator in `Idle`.
    #[must_use]
    pub fn new(
        receiver: SignalReceiver,
        waiter: SignalWaiter,
        source: D,
        table: Arc<RecoveryTable>,
        sink: S,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            receiver,
            waiter,
            source,
            table,
            sink,
            attributor: DiagnosticAttributor::new(),
            options,
            shared: Arc::new(SharedStatus::default()),
        }
    }

    /// Observer sharing this coordinator's state and counters.
    #[must_use]
    pub fn observer(&self) -> CoordinatorObserver {
        CoordinatorObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.observer().state()
    }

    /// Wait in `Idle`, then handle the wake.
    ///
    /// Returns [`CycleOutcome::Spurious`] only when the wait timeout fires
    /// with nothing pending.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.set_state(CoordinatorState::Idle);
        self.wait_for_signal();
        self.handle_wake()
    }

    /// Block until the flag is pending or the wait timeout elapses.
    ///
    /// Always parks at least once so the wake token posted with a raise is
    /// consumed together with the flag. Wakes that find the flag clear are
    /// counted and the wait resumes.
    fn wait_for_signal(&self) {
        let deadline = self
            .options
            .wait_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        loop {
            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return;
                    }
                    self.waiter.wait(Some(remaining));
                }
                None => self.waiter.wait(None),
            }
            if self.receiver.is_pending() {
                return;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return;
            }
            CoordinatorMetrics::bump(&self.shared.metrics.spurious_wakes);
            tracing::trace!("Coordinator woke with no pending expiry; waiting again");
        }
    }

    /// Run cycles for the lifetime of the process.
    pub fn run(mut self) -> ! {
        tracing::info!(
            policy = ?self.options.dispatch_policy,
            mode = ?self.options.diagnostic_mode,
            "Recovery coordinator started"
        );
        loop {
            if let CycleOutcome::Recovered(report) = self.run_cycle() {
                tracing::trace!(actions = report.dispatched.len(), "Recovery cycle finished");
            }
        }
    }

    /// Handle one wake without waiting: `Signaled` through back to `Idle`.
    pub fn handle_wake(&mut self) -> CycleOutcome {
        self.set_state(CoordinatorState::Signaled);
        if !self.receiver.take() {
            CoordinatorMetrics::bump(&self.shared.metrics.spurious_wakes);
            tracing::trace!("Coordinator woke with no pending expiry");
            self.set_state(CoordinatorState::Idle);
            return CycleOutcome::Spurious;
        }

        self.set_state(CoordinatorState::Diagnosing);
        let attribution = self.diagnose();

        self.set_state(CoordinatorState::Dispatching);
        let dispatched = self.dispatch(&attribution);

        let metrics = &self.shared.metrics;
        CoordinatorMetrics::bump(&metrics.cycles);
        if attribution.captured {
            CoordinatorMetrics::bump(&metrics.attributed_cycles);
        }
        if dispatched.iter().any(|r| r.target == DEFAULT_TARGET) {
            CoordinatorMetrics::bump(&metrics.fallback_cycles);
        }
        tracing::info!(actions = dispatched.len(), "Recovery complete");

        self.set_state(CoordinatorState::Idle);
        if let Some(delay) = self.options.post_cycle_delay {
            std::thread::sleep(delay);
        }
        CycleOutcome::Recovered(CycleReport {
            attribution,
            dispatched,
        })
    }

    fn diagnose(&mut self) -> AttributionResult {
        self.attributor.reset();
        let attribution = match self.options.diagnostic_mode {
            DiagnosticMode::Snapshot => {
                DiagnosticAttributor::attribute_snapshot(&self.source.snapshot())
            }
            DiagnosticMode::LegacyReport => {
                let attributor = &mut self.attributor;
                self.source.report(&mut |line| attributor.feed_line(line));
                self.attributor.finish()
            }
        };

        if attribution.captured {
            let names: Vec<&str> = attribution.names.iter().map(UnitName::as_str).collect();
            tracing::error!(units = ?names, "Unit failed to renew its lease in time");
        } else {
            tracing::warn!("Lease expiry could not be attributed to a unit");
        }
        attribution
    }

    fn plan(&self, attribution: &AttributionResult) -> Vec<(String, RecoveryAction)> {
        let mut plan: Vec<(String, RecoveryAction)> = Vec::new();
        let mut needs_default = !attribution.captured;

        let targets: Vec<&UnitName> = match self.options.dispatch_policy {
            DispatchPolicy::EachAttributed => attribution.names.iter().collect(),
            DispatchPolicy::LastOnly => attribution.name.iter().collect(),
        };
        for name in targets {
            if plan.iter().any(|(target, _)| target.as_str() == name.as_str()) {
                continue;
            }
            match self.table.lookup(name) {
                Some(action) => plan.push((name.to_string(), *action)),
                None => {
                    tracing::warn!(unit = %name, "No recovery action configured for unit");
                    needs_default = true;
                }
            }
        }

        if needs_default {
            match self.table.default_action() {
                Some(action) => plan.push((DEFAULT_TARGET.to_string(), *action)),
                None => tracing::debug!("No default recovery action configured"),
            }
        }
        plan
    }

    fn dispatch(&self, attribution: &AttributionResult) -> Vec<DispatchRecord> {
        let metrics = &self.shared.metrics;
        self.plan(attribution)
            .into_iter()
            .map(|(target, action)| {
                tracing::info!(
                    target_unit = %target,
                    sink = action.sink,
                    toggles = action.pattern.toggles,
                    "Performing recovery action"
                );
                let error = action.execute(&self.sink, &target).err();
                CoordinatorMetrics::bump(&metrics.actions_run);
                if let Some(err) = &error {
                    CoordinatorMetrics::bump(&metrics.action_failures);
                    tracing::error!(target_unit = %target, error = %err, "Recovery action failed");
                }
                DispatchRecord {
                    target,
                    action,
                    error,
                }
            })
            .collect()
    }

    fn set_state(&self, state: CoordinatorState) {
        self.shared.state.store(state.to_raw(), Ordering::Release);
    }
}

impl<D, S: fmt::Debug> fmt::Debug for RecoveryCoordinator<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("receiver", &self.receiver)
            .field("sink", &self.sink)
            .field("options", &self.options)
            .field("state", &self.shared.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
