//! Software timer subsystem.
//!
//! Stands in for a hardware task watchdog: it periodically scans the registry,
//! fires the interrupt bridge when a lease newly expires, and answers the
//! coordinator's diagnostic queries from the registry.

use std::sync::Arc;
use std::time::Duration;

use tasklease_signal::{InterruptBridge, IsrOutcome, WakePrimitive};

use crate::diagnostic::{DiagnosticSnapshot, DiagnosticSource};
use crate::error::SupervisorResult;
use crate::registry::{LeaseRegistry, MonitoredUnit};
use crate::task::{BackgroundTask, stop_requested};

/// First line of the legacy diagnostic report.
pub const REPORT_BANNER: &str =
    "Task watchdog got triggered. The following tasks/users did not reset the watchdog in time:";

/// Periodic expiry scanner that owns the interrupt bridge.
#[derive(Debug)]
pub struct SoftwareTimer<W: WakePrimitive> {
    bridge: InterruptBridge<W>,
    registry: Arc<LeaseRegistry>,
}

impl<W: WakePrimitive> SoftwareTimer<W> {
    /// Create a timer over `registry`.
    #[must_use]
    pub fn new(bridge: InterruptBridge<W>, registry: Arc<LeaseRegistry>) -> Self {
        Self { bridge, registry }
    }

    /// Scan once; fire the bridge if any lease newly expired.
    ///
    /// The bridge fires at most once per poll regardless of how many units
    /// expired. A requested context switch is honoured with a yield.
    pub fn poll(&self) -> Option<IsrOutcome> {
        if self.registry.scan_expired() == 0 {
            return None;
        }
        let outcome = self.bridge.on_expiry();
        if outcome.yield_requested {
            std::thread::yield_now();
        }
        Some(outcome)
    }

    /// Run [`SoftwareTimer::poll`] every `tick` on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TimerInit`](crate::SupervisorError::TimerInit)
    /// if the thread cannot be spawned.
    pub fn spawn(self, tick: Duration) -> SupervisorResult<BackgroundTask<()>>
    where
        W: 'static,
    {
        BackgroundTask::spawn("tasklease-timer", move |stop| {
            tracing::debug!(tick_ms = tick.as_millis(), "Software timer started");
            while !stop_requested(stop) {
                if let Some(outcome) = self.poll() {
                    tracing::trace!(newly_pending = outcome.newly_pending, "Expiry signaled");
                }
                std::thread::sleep(tick);
            }
            tracing::debug!("Software timer stopped");
        })
    }
}

/// [`DiagnosticSource`] that reports the registry's expired leases.
#[derive(Debug, Clone)]
pub struct RegistryDiagnostics {
    registry: Arc<LeaseRegistry>,
    cores: u32,
}

impl RegistryDiagnostics {
    /// Report over `registry` for `cores` cores.
    #[must_use]
    pub fn new(registry: Arc<LeaseRegistry>, cores: u32) -> Self {
        Self { registry, cores }
    }
}

impl DiagnosticSource for RegistryDiagnostics {
    fn snapshot(&self) -> DiagnosticSnapshot {
        let expired = self.registry.expired();
        let mut snapshot = DiagnosticSnapshot::new();
        for core in 0..self.cores {
            let mut any = false;
            for unit in expired.iter().filter(|u| u.core == core) {
                snapshot.push_expired(core, &unit.name);
                any = true;
            }
            if !any {
                snapshot.push_idle(core);
            }
        }
        for unit in expired.iter().filter(|u| u.core >= self.cores) {
            snapshot.push_expired(unit.core, &unit.name);
        }
        snapshot
    }

    fn report(&self, line: &mut dyn FnMut(&str)) {
        let expired: Vec<MonitoredUnit> = self.registry.expired();
        if expired.is_empty() {
            return;
        }
        line(REPORT_BANNER);
        for unit in &expired {
            line(" - ");
            line(&unit.name);
            line(&format!(" (CPU {})", unit.core));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::diagnostic::DiagnosticAttributor;
    use crate::registry::LeaseOptions;
    use crate::wake::wake_pair;
    use tasklease_signal::recovery_channel;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn registry() -> Result<(Arc<LeaseRegistry>, Arc<ManualClock>), Box<dyn std::error::Error>> {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(LeaseRegistry::new(Duration::from_millis(1000), clock.clone())?);
        Ok((registry, clock))
    }

    #[test]
    fn test_poll_fires_once_for_many_units() -> TestResult {
        let (registry, clock) = registry()?;
        registry.register("a")?;
        registry.register("b")?;
        let (wake, _waiter) = wake_pair();
        let (bridge, receiver) = recovery_channel(wake);
        let timer = SoftwareTimer::new(bridge, Arc::clone(&registry));

        assert!(timer.poll().is_none());
        clock.advance(Duration::from_millis(1001));
        let outcome = timer.poll().ok_or("expected the bridge to fire")?;
        assert!(outcome.newly_pending);
        assert!(timer.poll().is_none());

        assert!(receiver.take());
        assert_eq!(receiver.metrics().raised, 1);
        Ok(())
    }

    #[test]
    fn test_snapshot_lists_idle_cores() -> TestResult {
        let (registry, clock) = registry()?;
        registry.register_with("on_one", LeaseOptions::default().on_core(1))?;
        let diagnostics = RegistryDiagnostics::new(Arc::clone(&registry), 2);

        assert!(diagnostics.snapshot().is_clear());
        clock.advance(Duration::from_millis(1500));

        let snapshot = diagnostics.snapshot();
        let entries = snapshot.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.first().is_some_and(|e| e.core == 0 && e.unit.is_none()));
        assert!(entries.get(1).is_some_and(|e| e.unit.as_deref() == Some("on_one")));
        Ok(())
    }

    #[test]
    fn test_report_parses_back() -> TestResult {
        let (registry, clock) = registry()?;
        registry.register("test_user")?;
        registry.register_with("test_2_user", LeaseOptions::default().on_core(1))?;
        let diagnostics = RegistryDiagnostics::new(Arc::clone(&registry), 2);
        clock.advance(Duration::from_millis(2000));

        let mut attributor = DiagnosticAttributor::new();
        diagnostics.report(&mut |line| attributor.feed_line(line));
        let result = attributor.finish();
        let names: Vec<&str> = result.names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["test_user", "test_2_user"]);
        Ok(())
    }

    #[test]
    fn test_empty_report_when_nothing_expired() -> TestResult {
        let (registry, _clock) = registry()?;
        registry.register("test_user")?;
        let diagnostics = RegistryDiagnostics::new(registry, 1);
        let mut lines = 0;
        diagnostics.report(&mut |_| lines += 1);
        assert_eq!(lines, 0);
        Ok(())
    }
}
