//! Monitored-unit harness.
//!
//! Worker loops that renew their lease on a fixed schedule, including skip
//! windows that deliberately let the lease expire. Used to drive the expiry
//! and recovery path in demos and tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SupervisorError, SupervisorResult};
use crate::recovery::RecoverySink;
use crate::registry::{LeaseRegistry, UnitHandle};
use crate::task::{BackgroundTask, stop_requested};

/// One tick of a renewal schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Renew the lease.
    Renew,
    /// Do nothing this tick.
    Skip,
}

/// Sequence of steps executed one per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalSchedule {
    steps: Vec<Step>,
    repeat: bool,
}

impl RenewalSchedule {
    /// Schedule from explicit steps.
    ///
    /// # Errors
    ///
    /// Returns an error if `steps` is empty.
    pub fn new(steps: Vec<Step>, repeat: bool) -> SupervisorResult<Self> {
        if steps.is_empty() {
            return Err(SupervisorError::invalid_configuration(
                "renewal schedule must have at least one step",
            ));
        }
        Ok(Self { steps, repeat })
    }

    /// Parse `R` (renew) and `S` or `.` (skip); whitespace is ignored.
    ///
    /// The parsed schedule runs once.
    ///
    /// # Errors
    ///
    /// Returns an error on any other character or an empty pattern.
    pub fn parse(pattern: &str) -> SupervisorResult<Self> {
        let steps = pattern
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                'R' | 'r' => Ok(Step::Renew),
                'S' | 's' | '.' => Ok(Step::Skip),
                other => Err(SupervisorError::invalid_configuration(format!(
                    "unknown schedule step '{other}'"
                ))),
            })
            .collect::<SupervisorResult<Vec<_>>>()?;
        Self::new(steps, false)
    }

    /// The repeating 31-step demo cycle: renew 3, skip 7,
    /// renew 9, skip 11, renew 1.
    #[must_use]
    pub fn reference_cycle() -> Self {
        let runs = [
            (Step::Renew, 3),
            (Step::Skip, 7),
            (Step::Renew, 9),
            (Step::Skip, 11),
            (Step::Renew, 1),
        ];
        let steps = runs
            .iter()
            .flat_map(|&(step, count)| std::iter::repeat_n(step, count))
            .collect();
        Self {
            steps,
            repeat: true,
        }
    }

    /// Set whether the schedule wraps around.
    #[must_use]
    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Whether the schedule wraps around.
    #[must_use]
    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    /// Steps of one pass.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step executed at tick `index`, or `None` once a one-shot schedule ends.
    #[must_use]
    pub fn step_at(&self, index: usize) -> Option<Step> {
        if self.repeat {
            self.steps.get(index % self.steps.len()).copied()
        } else {
            self.steps.get(index).copied()
        }
    }
}

/// Heartbeat output toggled on every tick.
#[derive(Clone)]
struct Heartbeat {
    sink: Arc<dyn RecoverySink>,
    id: u32,
}

/// Worker that renews one unit's lease according to a schedule.
pub struct UnitWorker {
    registry: Arc<LeaseRegistry>,
    handle: UnitHandle,
    name: String,
    schedule: RenewalSchedule,
    position: usize,
    heartbeat: Option<Heartbeat>,
}

impl UnitWorker {
    /// Worker for a registered unit.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if `handle` is not registered.
    pub fn new(
        registry: Arc<LeaseRegistry>,
        handle: UnitHandle,
        schedule: RenewalSchedule,
    ) -> SupervisorResult<Self> {
        let name = registry.unit(handle)?.name;
        Ok(Self {
            registry,
            handle,
            name,
            schedule,
            position: 0,
            heartbeat: None,
        })
    }

    /// Toggle `sink` on every tick as a liveness indicator.
    #[must_use]
    pub fn with_heartbeat(mut self, sink: Arc<dyn RecoverySink>, id: u32) -> Self {
        self.heartbeat = Some(Heartbeat { sink, id });
        self
    }

    /// Handle of the supervised unit.
    #[must_use]
    pub fn handle(&self) -> UnitHandle {
        self.handle
    }

    /// Ticks executed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Execute the next tick.
    ///
    /// Returns `Ok(None)` once a one-shot schedule is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if the unit was unregistered.
    pub fn step(&mut self) -> SupervisorResult<Option<Step>> {
        let Some(step) = self.schedule.step_at(self.position) else {
            return Ok(None);
        };
        self.position = self.position.saturating_add(1);

        match step {
            Step::Renew => {
                self.registry.renew(self.handle)?;
                tracing::debug!(unit = %self.name, tick = self.position, "Lease renewed by worker");
            }
            Step::Skip => {
                tracing::debug!(unit = %self.name, tick = self.position, "Skipping lease renewal");
            }
        }

        if let Some(heartbeat) = &self.heartbeat {
            let on = self.position % 2 == 1;
            if let Err(err) = heartbeat.sink.set_level(heartbeat.id, on) {
                tracing::warn!(unit = %self.name, error = %err, "Heartbeat output failed");
            }
        }
        Ok(Some(step))
    }

    /// Execute up to `ticks` steps without sleeping.
    ///
    /// Returns the number of steps executed.
    ///
    /// # Errors
    ///
    /// Stops at the first [`SupervisorError::UnknownHandle`].
    pub fn run_ticks(&mut self, ticks: usize) -> SupervisorResult<usize> {
        let mut executed = 0;
        for _ in 0..ticks {
            if self.step()?.is_none() {
                break;
            }
            executed += 1;
        }
        Ok(executed)
    }

    /// Run one step every `tick` on a dedicated thread.
    ///
    /// The thread ends when stopped, when a one-shot schedule is exhausted,
    /// or on the first error, which it returns.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TimerInit`] if the thread cannot be spawned.
    pub fn spawn(mut self, tick: Duration) -> SupervisorResult<BackgroundTask<SupervisorResult<()>>> {
        let thread_name = format!("unit-{}", self.name);
        BackgroundTask::spawn(&thread_name, move |stop| {
            while !stop_requested(stop) {
                match self.step() {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(unit = %self.name, error = %err, "Unit worker stopped");
                        return Err(err);
                    }
                }
                std::thread::sleep(tick);
            }
            Ok(())
        })
    }
}

impl fmt::Debug for UnitWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitWorker")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("schedule_len", &self.schedule.steps.len())
            .field("heartbeat", &self.heartbeat.as_ref().map(|h| h.id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::recovery::RecordingSink;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_parse() -> SupervisorResult<()> {
        let schedule = RenewalSchedule::parse("RR S.")?;
        assert_eq!(
            schedule.steps(),
            &[Step::Renew, Step::Renew, Step::Skip, Step::Skip]
        );
        assert!(!schedule.is_repeating());
        assert!(RenewalSchedule::parse("RX").is_err());
        assert!(RenewalSchedule::parse("  ").is_err());
        Ok(())
    }

    #[test]
    fn test_reference_cycle_shape() {
        let schedule = RenewalSchedule::reference_cycle();
        assert_eq!(schedule.steps().len(), 31);
        let renewals = schedule.steps().iter().filter(|s| **s == Step::Renew).count();
        assert_eq!(renewals, 13);
        assert_eq!(schedule.step_at(3), Some(Step::Skip));
        assert_eq!(schedule.step_at(31), Some(Step::Renew));
    }

    #[test]
    fn test_one_shot_schedule_ends() -> TestResult {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(LeaseRegistry::new(Duration::from_secs(5), clock)?);
        let handle = registry.register("test_user")?;
        let mut worker = UnitWorker::new(Arc::clone(&registry), handle, RenewalSchedule::parse("RS")?)?;

        assert_eq!(worker.run_ticks(10)?, 2);
        assert_eq!(worker.step()?, None);
        assert_eq!(registry.status(handle)?.renewals, 1);
        Ok(())
    }

    #[test]
    fn test_unregistered_unit_stops_worker() -> TestResult {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(LeaseRegistry::new(Duration::from_secs(5), clock)?);
        let handle = registry.register("test_user")?;
        let schedule = RenewalSchedule::parse("R")?.repeating(true);
        let mut worker = UnitWorker::new(Arc::clone(&registry), handle, schedule)?;

        worker.step()?;
        registry.unregister(handle)?;
        assert_eq!(worker.run_ticks(3), Err(SupervisorError::UnknownHandle(handle)));
        Ok(())
    }

    #[test]
    fn test_heartbeat_toggles() -> TestResult {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(LeaseRegistry::new(Duration::from_secs(5), clock)?);
        let handle = registry.register("test_user")?;
        let sink = Arc::new(RecordingSink::new());
        let mut worker = UnitWorker::new(Arc::clone(&registry), handle, RenewalSchedule::parse("RSR")?)?
            .with_heartbeat(sink.clone(), 2);

        worker.run_ticks(3)?;
        let levels: Vec<bool> = sink.transitions_for(2).iter().map(|t| t.on).collect();
        assert_eq!(levels, vec![true, false, true]);
        Ok(())
    }
}
