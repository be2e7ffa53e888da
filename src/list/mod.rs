//! # List
//!
//! Enumerates the probes the kernel and user-space binaries expose, and
//! prints the ones matching a search expression.

#[allow(clippy::module_inception)]
pub(crate) mod list;
pub(crate) use list::*;
