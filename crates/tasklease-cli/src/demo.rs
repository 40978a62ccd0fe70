//! Demo configuration and runner.
//!
//! Without a config file the demo runs two units
//! on separate cores, each with its own status output and recovery action,
//! both following the 31-step renew/skip cycle.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tasklease_supervisor::{
    CoordinatorMetricsSnapshot, DefaultActionSpec, LeaseOptions, MonotonicClock,
    RecoveryActionSpec, RecoverySink, RecoveryTableSpec, RenewalSchedule, Supervisor,
    SupervisorConfig, TracingSink, UnitWorker,
};

use crate::error::CliError;

/// Schedule keyword that selects the built-in renew/skip cycle.
const REFERENCE_SCHEDULE: &str = "reference";

/// One demo unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    /// Worker tick in milliseconds.
    pub tick_ms: u64,
    /// `reference` or an `R`/`S` pattern.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_repeat")]
    pub repeat: bool,
    #[serde(default)]
    pub core: u32,
    /// Per-unit lease timeout; the supervisor default when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Output toggled every tick as a liveness indicator.
    #[serde(default)]
    pub heartbeat_sink: Option<u32>,
}

impl UnitSpec {
    fn renewal_schedule(&self) -> Result<RenewalSchedule, CliError> {
        let schedule = if self.schedule.eq_ignore_ascii_case(REFERENCE_SCHEDULE) {
            RenewalSchedule::reference_cycle()
        } else {
            RenewalSchedule::parse(&self.schedule)?
        };
        Ok(schedule.repeating(self.repeat))
    }

    fn lease_options(&self) -> LeaseOptions {
        LeaseOptions {
            timeout: self.timeout_ms.map(Duration::from_millis),
            core: self.core,
        }
    }
}

fn default_schedule() -> String {
    REFERENCE_SCHEDULE.to_string()
}

fn default_repeat() -> bool {
    true
}

/// Demo file layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub recovery: RecoveryTableSpec,
    #[serde(default)]
    pub units: Vec<UnitSpec>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            recovery: RecoveryTableSpec {
                actions: vec![
                    RecoveryActionSpec {
                        unit: "test_user".to_string(),
                        sink: 2,
                        toggles: 10,
                        interval_ms: 100,
                    },
                    RecoveryActionSpec {
                        unit: "test_2_user".to_string(),
                        sink: 15,
                        toggles: 10,
                        interval_ms: 100,
                    },
                ],
                default_action: Some(DefaultActionSpec {
                    sink: 2,
                    toggles: 10,
                    interval_ms: 100,
                }),
            },
            units: vec![
                UnitSpec {
                    name: "test_user".to_string(),
                    tick_ms: 1000,
                    schedule: default_schedule(),
                    repeat: true,
                    core: 0,
                    timeout_ms: None,
                    heartbeat_sink: Some(2),
                },
                UnitSpec {
                    name: "test_2_user".to_string(),
                    tick_ms: 1500,
                    schedule: default_schedule(),
                    repeat: true,
                    core: 1,
                    timeout_ms: None,
                    heartbeat_sink: Some(15),
                },
            ],
        }
    }
}

impl DemoConfig {
    /// Load a YAML demo file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CliError> {
        self.supervisor.validate()?;
        for unit in &self.units {
            if unit.tick_ms == 0 {
                return Err(CliError::InvalidConfiguration(format!(
                    "unit '{}': tick_ms must be greater than 0",
                    unit.name
                )));
            }
            unit.renewal_schedule()?;
        }
        Ok(())
    }
}

/// Run the demo for `duration`, or until the process is killed.
///
/// Returns the coordinator counters at the end of the run.
pub fn run(config: DemoConfig, duration: Option<Duration>) -> Result<CoordinatorMetricsSnapshot, CliError> {
    config.validate()?;
    let table = config.recovery.clone().into_table()?;
    let sink: Arc<dyn RecoverySink> = Arc::new(TracingSink);

    let supervisor = Supervisor::start(
        config.supervisor.clone(),
        table,
        Arc::clone(&sink),
        Arc::new(MonotonicClock::new()),
    )?;

    let mut workers = Vec::with_capacity(config.units.len());
    for unit in &config.units {
        let handle = supervisor
            .registry()
            .register_with(&unit.name, unit.lease_options())?;
        let mut worker = UnitWorker::new(
            Arc::clone(supervisor.registry()),
            handle,
            unit.renewal_schedule()?,
        )?;
        if let Some(id) = unit.heartbeat_sink {
            worker = worker.with_heartbeat(Arc::clone(&sink), id);
        }
        workers.push(worker.spawn(Duration::from_millis(unit.tick_ms))?);
    }
    tracing::info!(units = config.units.len(), "Demo running");

    match duration {
        Some(duration) => std::thread::sleep(duration),
        None => loop {
            std::thread::park();
        },
    }

    for worker in workers {
        let name = worker.name().to_string();
        if let Err(err) = worker.stop()? {
            tracing::warn!(worker = %name, error = %err, "Unit worker ended with an error");
        }
    }
    let metrics = supervisor.coordinator_metrics();
    supervisor.shutdown()?;
    Ok(metrics)
}
