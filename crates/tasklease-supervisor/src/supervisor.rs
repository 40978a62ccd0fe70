//! Supervisor bring-up.
//!
//! Wires the registry, the recovery channel, the software timer and the
//! recovery coordinator together and starts their threads.

use std::sync::Arc;

use tasklease_signal::recovery_channel;

use crate::clock::Clock;
use crate::config::SupervisorConfig;
use crate::coordinator::{
    CoordinatorMetricsSnapshot, CoordinatorObserver, CoordinatorOptions, CoordinatorState,
    RecoveryCoordinator,
};
use crate::error::{SupervisorError, SupervisorResult};
use crate::recovery::{RecoverySink, RecoveryTable};
use crate::registry::LeaseRegistry;
use crate::task::BackgroundTask;
use crate::timer::{RegistryDiagnostics, SoftwareTimer};
use crate::wake::wake_pair;

/// A running lease supervisor.
///
/// The coordinator thread runs for the lifetime of the process. Dropping or
/// shutting down the supervisor stops only the software timer, after which
/// no further expiries are detected.
#[derive(Debug)]
pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<LeaseRegistry>,
    observer: CoordinatorObserver,
    timer: BackgroundTask<()>,
}

impl Supervisor {
    /// Validate `config` and start the timer and coordinator threads.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidConfiguration`] for an invalid
    /// configuration and [`SupervisorError::TimerInit`] if a thread cannot be
    /// started. Both are fatal at startup.
    pub fn start<S>(
        config: SupervisorConfig,
        table: RecoveryTable,
        sink: S,
        clock: Arc<dyn Clock>,
    ) -> SupervisorResult<Self>
    where
        S: RecoverySink + 'static,
    {
        config.validate()?;
        let registry = Arc::new(LeaseRegistry::new(config.timeout(), clock)?);

        let (wake, waiter) = wake_pair();
        let (bridge, receiver) = recovery_channel(wake);

        let coordinator = RecoveryCoordinator::new(
            receiver,
            waiter,
            RegistryDiagnostics::new(Arc::clone(&registry), config.cores),
            Arc::new(table),
            sink,
            CoordinatorOptions::from_config(&config),
        );
        let observer = coordinator.observer();
        std::thread::Builder::new()
            .name("tasklease-recovery".to_string())
            .spawn(move || {
                coordinator.run();
            })
            .map_err(|e| {
                SupervisorError::timer_init(format!("failed to spawn recovery coordinator: {e}"))
            })?;

        let timer = SoftwareTimer::new(bridge, Arc::clone(&registry)).spawn(config.timer_tick())?;

        tracing::info!(
            timeout_ms = config.timeout_ms,
            timer_tick_ms = config.timer_tick_ms,
            cores = config.cores,
            policy = ?config.dispatch_policy,
            mode = ?config.diagnostic_mode,
            "Lease supervisor started"
        );
        Ok(Self {
            config,
            registry,
            observer,
            timer,
        })
    }

    /// The shared lease registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<LeaseRegistry> {
        &self.registry
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Observer of the coordinator thread.
    #[must_use]
    pub fn observer(&self) -> &CoordinatorObserver {
        &self.observer
    }

    /// Current coordinator state.
    #[must_use]
    pub fn coordinator_state(&self) -> CoordinatorState {
        self.observer.state()
    }

    /// Coordinator counters.
    #[must_use]
    pub fn coordinator_metrics(&self) -> CoordinatorMetricsSnapshot {
        self.observer.metrics()
    }

    /// Stop the software timer. No further expiries are detected.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TaskPanicked`] if the timer thread panicked.
    pub fn shutdown(self) -> SupervisorResult<()> {
        self.timer.stop()?;
        tracing::info!("Lease supervisor timer stopped");
        Ok(())
    }
}
