//! Supervisor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SupervisorError, SupervisorResult};

/// How many recovery actions one cycle may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// One action per distinct attributed unit, at most one default action.
    #[default]
    EachAttributed,
    /// Only the last attributed unit.
    LastOnly,
}

/// Which diagnostic form the coordinator asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticMode {
    /// Structured per-core snapshot.
    #[default]
    Snapshot,
    /// Line report parsed by the attributor.
    LegacyReport,
}

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Global lease timeout (milliseconds).
    pub timeout_ms: u64,
    /// Abort the process on expiry. Must stay `false`.
    pub panic_on_expiry: bool,
    /// Software timer scan period (milliseconds).
    pub timer_tick_ms: u64,
    /// Number of cores reported in diagnostic snapshots.
    pub cores: u32,
    /// Bound on the coordinator's wait (milliseconds); `None` waits forever.
    pub wait_timeout_ms: Option<u64>,
    /// Debounce after each recovery cycle (milliseconds); 0 disables it.
    pub post_cycle_delay_ms: u64,
    /// Recovery dispatch policy.
    pub dispatch_policy: DispatchPolicy,
    /// Diagnostic form requested each cycle.
    pub diagnostic_mode: DiagnosticMode,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            panic_on_expiry: false,
            timer_tick_ms: 100,
            cores: 2,
            wait_timeout_ms: None,
            post_cycle_delay_ms: 100,
            dispatch_policy: DispatchPolicy::default(),
            diagnostic_mode: DiagnosticMode::default(),
        }
    }
}

impl SupervisorConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.timeout_ms == 0 {
            return Err(SupervisorError::invalid_configuration(
                "timeout_ms must be greater than 0",
            ));
        }
        if self.panic_on_expiry {
            return Err(SupervisorError::invalid_configuration(
                "panic_on_expiry is not supported: expiry is handled by the recovery coordinator",
            ));
        }
        if self.timer_tick_ms == 0 {
            return Err(SupervisorError::invalid_configuration(
                "timer_tick_ms must be greater than 0",
            ));
        }
        if self.timer_tick_ms >= self.timeout_ms {
            return Err(SupervisorError::invalid_configuration(
                "timer_tick_ms must be less than timeout_ms",
            ));
        }
        if self.cores == 0 {
            return Err(SupervisorError::invalid_configuration(
                "cores must be at least 1",
            ));
        }
        if self.wait_timeout_ms == Some(0) {
            return Err(SupervisorError::invalid_configuration(
                "wait_timeout_ms must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Global lease timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Software timer scan period.
    #[must_use]
    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }

    /// Coordinator wait bound.
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Post-cycle debounce.
    #[must_use]
    pub fn post_cycle_delay(&self) -> Option<Duration> {
        (self.post_cycle_delay_ms > 0).then(|| Duration::from_millis(self.post_cycle_delay_ms))
    }
}

/// Builder for `SupervisorConfig`.
#[derive(Debug, Default)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    /// Set the global lease timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set `panic_on_expiry`. Validation rejects `true`.
    #[must_use]
    pub fn panic_on_expiry(mut self, enabled: bool) -> Self {
        self.config.panic_on_expiry = enabled;
        self
    }

    /// Set the timer scan period in milliseconds.
    #[must_use]
    pub fn timer_tick_ms(mut self, ms: u64) -> Self {
        self.config.timer_tick_ms = ms;
        self
    }

    /// Set the number of reported cores.
    #[must_use]
    pub fn cores(mut self, cores: u32) -> Self {
        self.config.cores = cores;
        self
    }

    /// Bound the coordinator's wait.
    #[must_use]
    pub fn wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.wait_timeout_ms = Some(ms);
        self
    }

    /// Set the post-cycle debounce in milliseconds.
    #[must_use]
    pub fn post_cycle_delay_ms(mut self, ms: u64) -> Self {
        self.config.post_cycle_delay_ms = ms;
        self
    }

    /// Set the dispatch policy.
    #[must_use]
    pub fn dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.config.dispatch_policy = policy;
        self
    }

    /// Set the diagnostic mode.
    #[must_use]
    pub fn diagnostic_mode(mut self, mode: DiagnosticMode) -> Self {
        self.config.diagnostic_mode = mode;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> SupervisorResult<SupervisorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
