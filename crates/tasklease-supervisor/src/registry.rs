//! Lease registry for monitored units.
//!
//! Tracks every monitored unit, its timeout and its last renewal. Only
//! normal-context code touches the registry; the interrupt bridge never does.
//!
//! # Expiry
//!
//! A unit's deadline is `last_renewal + timeout`. The lease is expired once the
//! clock is strictly past the deadline. [`LeaseRegistry::scan_expired`] reports
//! a silent unit at most once per timeout window, and renewal re-arms it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::error::{SupervisorError, SupervisorResult};

/// Identifier length bound of the diagnostic report, terminator included.
pub const MAX_UNIT_NAME_LEN: usize = 32;

/// Longest unit name that survives attribution without truncation.
pub const UNIT_NAME_CAPACITY: usize = MAX_UNIT_NAME_LEN - 1;

/// Opaque, stable identifier of a registered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitHandle(u64);

impl UnitHandle {
    /// Build a handle from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of the handle.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// A unit under lease supervision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredUnit {
    /// Unique, immutable name.
    pub name: String,
    /// Handle returned at registration.
    pub handle: UnitHandle,
    /// Lease timeout.
    pub timeout: Duration,
    /// Core the unit runs on, as reported in diagnostics.
    pub core: u32,
}

/// Per-unit registration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseOptions {
    /// Timeout override; `None` uses the registry default.
    pub timeout: Option<Duration>,
    /// Core affinity reported in diagnostics.
    pub core: u32,
}

impl LeaseOptions {
    /// Options with a unit-specific timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            core: 0,
        }
    }

    /// Set the core affinity.
    #[must_use]
    pub fn on_core(mut self, core: u32) -> Self {
        self.core = core;
        self
    }
}

/// Point-in-time view of one lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseStatus {
    /// The unit.
    pub unit: MonitoredUnit,
    /// Timestamp of the last renewal (registration counts as one).
    pub last_renewal: Duration,
    /// `last_renewal + timeout`.
    pub deadline: Duration,
    /// Whether the clock is past the deadline.
    pub expired: bool,
    /// Renewals since registration.
    pub renewals: u64,
}

#[derive(Debug, Clone)]
struct LeaseEntry {
    unit: MonitoredUnit,
    last_renewal: Duration,
    signaled_at: Option<Duration>,
    renewals: u64,
}

impl LeaseEntry {
    fn deadline(&self) -> Duration {
        self.last_renewal.saturating_add(self.unit.timeout)
    }

    fn is_expired(&self, now: Duration) -> bool {
        now > self.deadline()
    }

    /// Silent past the deadline and not signaled within the current window.
    fn needs_signal(&self, now: Duration) -> bool {
        if !self.is_expired(now) {
            return false;
        }
        match self.signaled_at {
            None => true,
            Some(at) => now.saturating_sub(at) > self.unit.timeout,
        }
    }

    fn status(&self, now: Duration) -> LeaseStatus {
        LeaseStatus {
            unit: self.unit.clone(),
            last_renewal: self.last_renewal,
            deadline: self.deadline(),
            expired: self.is_expired(now),
            renewals: self.renewals,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    leases: BTreeMap<UnitHandle, LeaseEntry>,
    names: HashMap<String, UnitHandle>,
    next_handle: u64,
}

/// Table of monitored units and their leases.
///
/// # Thread Safety
///
/// Internally synchronized with a `RwLock`; every method holds it only for a
/// bounded table operation. Never call from interrupt context.
pub struct LeaseRegistry {
    default_timeout: Duration,
    clock: Arc<dyn Clock>,
    inner: RwLock<RegistryInner>,
}

impl LeaseRegistry {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if `default_timeout` is zero.
    pub fn new(default_timeout: Duration, clock: Arc<dyn Clock>) -> SupervisorResult<Self> {
        validate_timeout(default_timeout)?;
        Ok(Self {
            default_timeout,
            clock,
            inner: RwLock::new(RegistryInner::default()),
        })
    }

    /// Create an empty registry on a [`MonotonicClock`].
    ///
    /// # Errors
    ///
    /// Returns an error if `default_timeout` is zero.
    pub fn with_monotonic_clock(default_timeout: Duration) -> SupervisorResult<Self> {
        Self::new(default_timeout, Arc::new(MonotonicClock::new()))
    }

    /// Timeout applied by [`LeaseRegistry::register`].
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The registry's time source.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a unit with the default timeout on core 0.
    ///
    /// The lease starts renewed at registration time.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::DuplicateName`] if the name is taken, or
    /// [`SupervisorError::InvalidName`] if it cannot appear in a diagnostic
    /// report.
    pub fn register(&self, name: &str) -> SupervisorResult<UnitHandle> {
        self.register_with(name, LeaseOptions::default())
    }

    /// Register a unit with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::DuplicateName`] if the name is taken,
    /// [`SupervisorError::InvalidName`] if it cannot appear in a diagnostic
    /// report, or [`SupervisorError::InvalidConfiguration`] for a zero timeout.
    pub fn register_with(&self, name: &str, options: LeaseOptions) -> SupervisorResult<UnitHandle> {
        validate_name(name)?;
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        validate_timeout(timeout)?;

        let now = self.clock.now();
        let handle = {
            let mut inner = self.inner.write();
            if inner.names.contains_key(name) {
                return Err(SupervisorError::duplicate_name(name));
            }
            let handle = UnitHandle(inner.next_handle);
            inner.next_handle = inner.next_handle.saturating_add(1);
            inner.names.insert(name.to_string(), handle);
            inner.leases.insert(
                handle,
                LeaseEntry {
                    unit: MonitoredUnit {
                        name: name.to_string(),
                        handle,
                        timeout,
                        core: options.core,
                    },
                    last_renewal: now,
                    signaled_at: None,
                    renewals: 0,
                },
            );
            handle
        };

        tracing::info!(
            unit = name,
            handle = %handle,
            timeout_ms = timeout.as_millis(),
            core = options.core,
            "Unit registered with lease watchdog"
        );
        Ok(handle)
    }

    /// Renew a unit's lease: its deadline becomes `now + timeout`.
    ///
    /// Repeated renewals at the same instant leave the same deadline. The
    /// stored renewal timestamp never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if the handle is not
    /// registered; the registry is left unchanged.
    pub fn renew(&self, handle: UnitHandle) -> SupervisorResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let entry = inner
            .leases
            .get_mut(&handle)
            .ok_or(SupervisorError::UnknownHandle(handle))?;
        entry.last_renewal = entry.last_renewal.max(now);
        entry.signaled_at = None;
        entry.renewals = entry.renewals.saturating_add(1);
        tracing::trace!(unit = %entry.unit.name, handle = %handle, "Lease renewed");
        Ok(())
    }

    /// Remove a unit from supervision.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if the handle is not
    /// registered.
    pub fn unregister(&self, handle: UnitHandle) -> SupervisorResult<MonitoredUnit> {
        let unit = {
            let mut inner = self.inner.write();
            let entry = inner
                .leases
                .remove(&handle)
                .ok_or(SupervisorError::UnknownHandle(handle))?;
            inner.names.remove(&entry.unit.name);
            entry.unit
        };
        tracing::info!(unit = %unit.name, handle = %handle, "Unit unregistered from lease watchdog");
        Ok(unit)
    }

    /// Look up a unit.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if the handle is not
    /// registered.
    pub fn unit(&self, handle: UnitHandle) -> SupervisorResult<MonitoredUnit> {
        let inner = self.inner.read();
        inner
            .leases
            .get(&handle)
            .map(|entry| entry.unit.clone())
            .ok_or(SupervisorError::UnknownHandle(handle))
    }

    /// Current deadline of a unit.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if the handle is not
    /// registered.
    pub fn deadline(&self, handle: UnitHandle) -> SupervisorResult<Duration> {
        let inner = self.inner.read();
        inner
            .leases
            .get(&handle)
            .map(LeaseEntry::deadline)
            .ok_or(SupervisorError::UnknownHandle(handle))
    }

    /// Point-in-time lease status of a unit.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownHandle`] if the handle is not
    /// registered.
    pub fn status(&self, handle: UnitHandle) -> SupervisorResult<LeaseStatus> {
        let now = self.clock.now();
        let inner = self.inner.read();
        inner
            .leases
            .get(&handle)
            .map(|entry| entry.status(now))
            .ok_or(SupervisorError::UnknownHandle(handle))
    }

    /// Handle registered under `name`.
    #[must_use]
    pub fn handle_of(&self, name: &str) -> Option<UnitHandle> {
        self.inner.read().names.get(name).copied()
    }

    /// Number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().leases.len()
    }

    /// Whether no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().leases.is_empty()
    }

    /// All registered units, ordered by handle.
    #[must_use]
    pub fn units(&self) -> Vec<MonitoredUnit> {
        let inner = self.inner.read();
        inner.leases.values().map(|entry| entry.unit.clone()).collect()
    }

    /// Units whose lease is currently expired, ordered by handle.
    #[must_use]
    pub fn expired(&self) -> Vec<MonitoredUnit> {
        let now = self.clock.now();
        let inner = self.inner.read();
        inner
            .leases
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.unit.clone())
            .collect()
    }

    /// Mark silent units as signaled and return how many newly need an
    /// expiry signal.
    ///
    /// Intended for timer subsystems: a non-zero return means the interrupt
    /// bridge should fire. A unit that stays silent is reported again only
    /// after another full timeout window.
    pub fn scan_expired(&self) -> usize {
        let now = self.clock.now();
        let mut newly_expired = Vec::new();
        {
            let mut inner = self.inner.write();
            for entry in inner.leases.values_mut() {
                if entry.needs_signal(now) {
                    entry.signaled_at = Some(now);
                    newly_expired.push((entry.unit.name.clone(), entry.deadline()));
                }
            }
        }

        for (name, deadline) in &newly_expired {
            tracing::warn!(
                unit = %name,
                overdue_ms = now.saturating_sub(*deadline).as_millis(),
                "Unit missed its lease deadline"
            );
        }
        newly_expired.len()
    }
}

impl fmt::Debug for LeaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseRegistry")
            .field("default_timeout", &self.default_timeout)
            .field("clock", &self.clock)
            .field("unit_count", &self.len())
            .finish()
    }
}

fn validate_timeout(timeout: Duration) -> SupervisorResult<()> {
    if timeout.is_zero() {
        return Err(SupervisorError::invalid_configuration(
            "lease timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> SupervisorResult<()> {
    if name.trim().is_empty() {
        return Err(SupervisorError::invalid_name(name, "name must not be empty"));
    }
    if name.len() > UNIT_NAME_CAPACITY {
        return Err(SupervisorError::invalid_name(
            name,
            "name exceeds the diagnostic identifier length",
        ));
    }
    if name.trim() != name {
        return Err(SupervisorError::invalid_name(
            name,
            "name must not have surrounding whitespace",
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(SupervisorError::invalid_name(
            name,
            "name must not contain control characters",
        ));
    }
    if name.contains(crate::diagnostic::ENTRY_MARKER) || name.contains(crate::diagnostic::CPU_MARKER)
    {
        return Err(SupervisorError::invalid_name(
            name,
            "name must not contain diagnostic report markers",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry_with_clock() -> SupervisorResult<(LeaseRegistry, Arc<ManualClock>)> {
        let clock = Arc::new(ManualClock::new());
        let registry = LeaseRegistry::new(Duration::from_millis(5000), clock.clone())?;
        Ok((registry, clock))
    }

    #[test]
    fn test_register_and_lookup() -> SupervisorResult<()> {
        let (registry, _clock) = registry_with_clock()?;
        let handle = registry.register("test_user")?;

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handle_of("test_user"), Some(handle));
        let unit = registry.unit(handle)?;
        assert_eq!(unit.name, "test_user");
        assert_eq!(unit.timeout, Duration::from_millis(5000));
        Ok(())
    }

    #[test]
    fn test_duplicate_name_rejected() -> SupervisorResult<()> {
        let (registry, _clock) = registry_with_clock()?;
        registry.register("test_user")?;
        let result = registry.register("test_user");
        assert_eq!(
            result,
            Err(SupervisorError::DuplicateName("test_user".to_string()))
        );
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[test]
    fn test_name_validation() -> SupervisorResult<()> {
        let (registry, _clock) = registry_with_clock()?;
        let too_long = "x".repeat(UNIT_NAME_CAPACITY + 1);
        let exact = "y".repeat(UNIT_NAME_CAPACITY);

        for bad in ["", "   ", " padded", "bad - name", "cpu (CPU 0)", "line\nbreak", too_long.as_str()] {
            assert!(
                matches!(registry.register(bad), Err(SupervisorError::InvalidName { .. })),
                "expected {bad:?} to be rejected"
            );
        }
        registry.register(&exact)?;
        Ok(())
    }

    #[test]
    fn test_renew_moves_deadline() -> SupervisorResult<()> {
        let (registry, clock) = registry_with_clock()?;
        let handle = registry.register("test_user")?;
        assert_eq!(registry.deadline(handle)?, Duration::from_millis(5000));

        clock.advance(Duration::from_millis(1000));
        registry.renew(handle)?;
        assert_eq!(registry.deadline(handle)?, Duration::from_millis(6000));
        assert_eq!(registry.status(handle)?.renewals, 1);
        Ok(())
    }

    #[test]
    fn test_unregister_invalidates_handle() -> SupervisorResult<()> {
        let (registry, _clock) = registry_with_clock()?;
        let handle = registry.register("test_user")?;
        let unit = registry.unregister(handle)?;
        assert_eq!(unit.name, "test_user");

        assert_eq!(registry.renew(handle), Err(SupervisorError::UnknownHandle(handle)));
        assert_eq!(
            registry.unregister(handle),
            Err(SupervisorError::UnknownHandle(handle))
        );
        assert!(registry.handle_of("test_user").is_none());

        // The name is free again, under a fresh handle.
        let again = registry.register("test_user")?;
        assert_ne!(again, handle);
        Ok(())
    }

    #[test]
    fn test_expiry_is_strictly_after_deadline() -> SupervisorResult<()> {
        let (registry, clock) = registry_with_clock()?;
        let handle = registry.register("test_user")?;

        clock.advance(Duration::from_millis(5000));
        assert!(!registry.status(handle)?.expired);
        assert_eq!(registry.scan_expired(), 0);

        clock.advance(Duration::from_millis(1));
        assert!(registry.status(handle)?.expired);
        assert_eq!(registry.expired().len(), 1);
        Ok(())
    }

    #[test]
    fn test_scan_signals_once_per_window() -> SupervisorResult<()> {
        let (registry, clock) = registry_with_clock()?;
        let handle = registry.register("test_user")?;

        clock.advance(Duration::from_millis(5001));
        assert_eq!(registry.scan_expired(), 1);
        for _ in 0..10 {
            clock.advance(Duration::from_millis(100));
            assert_eq!(registry.scan_expired(), 0);
        }

        // Still silent one full window later: reported again.
        clock.advance(Duration::from_millis(5000));
        assert_eq!(registry.scan_expired(), 1);

        // Renewal re-arms.
        registry.renew(handle)?;
        assert_eq!(registry.scan_expired(), 0);
        assert!(registry.expired().is_empty());
        Ok(())
    }

    #[test]
    fn test_per_unit_timeout() -> SupervisorResult<()> {
        let (registry, clock) = registry_with_clock()?;
        let fast = registry.register_with(
            "fast",
            LeaseOptions::with_timeout(Duration::from_millis(100)).on_core(1),
        )?;
        registry.register("slow")?;

        clock.advance(Duration::from_millis(200));
        let expired = registry.expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired.first().map(|u| u.handle), Some(fast));
        assert_eq!(expired.first().map(|u| u.core), Some(1));
        Ok(())
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let clock = Arc::new(ManualClock::new());
        assert!(LeaseRegistry::new(Duration::ZERO, clock).is_err());
    }
}
