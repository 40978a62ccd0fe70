//! Diagnostic snapshots and failure attribution.
//!
//! A timer subsystem describes which units currently show an expired lease in
//! one of two forms:
//!
//! - a structured [`DiagnosticSnapshot`], one [`CoreEntry`] per core, which
//!   [`DiagnosticAttributor::attribute_snapshot`] reads directly;
//! - a legacy line report, which [`DiagnosticAttributor`] parses line by line.
//!
//! # Line grammar
//!
//! ```text
//! Task watchdog got triggered. The following tasks/users did not reset the watchdog in time:
//!  - test_user          <- header: contains " -", optional name after it
//! test_user             <- detail: replaces the candidate name
//! 0x400d1234 (CPU 0)    <- terminator: contains "(CPU", commits the entry
//! ```
//!
//! A name is committed only when its entry terminates. Lines outside an open
//! entry that are not headers are ignored. Names are truncated on a character
//! boundary to [`UNIT_NAME_CAPACITY`] bytes.

use serde::Serialize;

use crate::registry::UNIT_NAME_CAPACITY;

/// Marker that opens a failed-unit entry.
pub const ENTRY_MARKER: &str = " -";

/// Marker that terminates a failed-unit entry.
pub const CPU_MARKER: &str = "(CPU";

/// Bounded unit identifier as it appears in diagnostics.
pub type UnitName = heapless::String<UNIT_NAME_CAPACITY>;

/// Truncate `text` to a [`UnitName`], never splitting a character.
#[must_use]
pub fn bounded_name(text: &str) -> UnitName {
    let mut name = UnitName::new();
    for ch in text.chars() {
        if name.push(ch).is_err() {
            break;
        }
    }
    name
}

/// One core's view in a structured snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreEntry {
    /// Core index.
    pub core: u32,
    /// Expired unit on this core, if any.
    pub unit: Option<UnitName>,
}

/// Ordered per-core description of expired units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticSnapshot {
    entries: Vec<CoreEntry>,
}

impl DiagnosticSnapshot {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry naming an expired unit.
    pub fn push_expired(&mut self, core: u32, unit: &str) {
        self.entries.push(CoreEntry {
            core,
            unit: Some(bounded_name(unit)),
        });
    }

    /// Append an entry for a core with no expired unit.
    pub fn push_idle(&mut self, core: u32) {
        self.entries.push(CoreEntry { core, unit: None });
    }

    /// Entries in report order.
    #[must_use]
    pub fn entries(&self) -> &[CoreEntry] {
        &self.entries
    }

    /// Names of expired units in report order.
    pub fn expired_units(&self) -> impl Iterator<Item = &UnitName> {
        self.entries.iter().filter_map(|entry| entry.unit.as_ref())
    }

    /// Whether the snapshot names no expired unit.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.expired_units().next().is_none()
    }
}

/// Producer of diagnostics, implemented by the timer subsystem.
///
/// Called from the coordinator's normal context, once per recovery cycle.
pub trait DiagnosticSource: Send {
    /// Structured view of the currently expired units.
    fn snapshot(&self) -> DiagnosticSnapshot;

    /// Emit the legacy line report, one fragment per call of `line`.
    fn report(&self, line: &mut dyn FnMut(&str));
}

impl<T: DiagnosticSource + Sync + ?Sized> DiagnosticSource for std::sync::Arc<T> {
    fn snapshot(&self) -> DiagnosticSnapshot {
        (**self).snapshot()
    }

    fn report(&self, line: &mut dyn FnMut(&str)) {
        (**self).report(line);
    }
}

/// Outcome of attributing one diagnostic report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributionResult {
    /// At least one entry was parsed.
    pub captured: bool,
    /// The last committed name.
    pub name: Option<UnitName>,
    /// Every committed name, in report order.
    pub names: Vec<UnitName>,
}

impl AttributionResult {
    fn from_names(names: Vec<UnitName>) -> Self {
        Self {
            captured: !names.is_empty(),
            name: names.last().cloned(),
            names,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct OpenEntry {
    candidate: Option<UnitName>,
}

/// Incremental parser for the legacy line report.
///
/// Holds the scratch state of one capture. [`DiagnosticAttributor::reset`]
/// discards it before the next cycle.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticAttributor {
    open: Option<OpenEntry>,
    committed: Vec<UnitName>,
}

impl DiagnosticAttributor {
    /// Attributor with empty scratch state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any partial capture.
    pub fn reset(&mut self) {
        self.open = None;
        self.committed.clear();
    }

    /// Feed one line (or fragment) of the report.
    pub fn feed_line(&mut self, line: &str) {
        let cpu_at = line.find(CPU_MARKER);

        if let Some(marker_at) = line.find(ENTRY_MARKER) {
            // A header after the terminator marker belongs to no entry.
            if cpu_at.is_none_or(|cpu| marker_at < cpu) {
                let rest = line.get(marker_at + ENTRY_MARKER.len()..).unwrap_or_default();
                let rest = match rest.find(CPU_MARKER) {
                    Some(end) => rest.get(..end).unwrap_or_default(),
                    None => rest,
                };
                if self.open.is_some() {
                    tracing::debug!("Diagnostic entry without terminator discarded");
                }
                self.open = Some(OpenEntry {
                    candidate: non_empty_name(rest),
                });
                if cpu_at.is_some() {
                    self.terminate();
                }
                return;
            }
        }

        let Some(entry) = self.open.as_mut() else {
            return;
        };
        if cpu_at.is_some() {
            self.terminate();
        } else if let Some(name) = non_empty_name(line) {
            entry.candidate = Some(name);
        }
    }

    /// Result of everything fed since the last reset.
    ///
    /// An entry still open has no terminator and contributes nothing.
    #[must_use]
    pub fn finish(&self) -> AttributionResult {
        AttributionResult::from_names(self.committed.clone())
    }

    /// Parse a complete report.
    #[must_use]
    pub fn attribute_lines<I, S>(lines: I) -> AttributionResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut attributor = Self::new();
        for line in lines {
            attributor.feed_line(line.as_ref());
        }
        attributor.finish()
    }

    /// Attribute a structured snapshot.
    #[must_use]
    pub fn attribute_snapshot(snapshot: &DiagnosticSnapshot) -> AttributionResult {
        AttributionResult::from_names(snapshot.expired_units().cloned().collect())
    }

    fn terminate(&mut self) {
        if let Some(name) = self.open.take().and_then(|entry| entry.candidate) {
            self.committed.push(name);
        }
    }
}

fn non_empty_name(text: &str) -> Option<UnitName> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(bounded_name(trimmed))
    }
}
