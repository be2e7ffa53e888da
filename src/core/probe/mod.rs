//! # Probe
//!
//! Module providing the probe type table, the canonical probe identifiers and
//! the fixed counter catalogs.

#[allow(clippy::module_inception)]
pub(crate) mod probe;
// Re-export probe.
pub(crate) use probe::*;
