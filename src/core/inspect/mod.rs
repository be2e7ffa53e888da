//! # Inspection helpers
//!
//! Provides support for inspecting the kernel: BTF descriptions and the
//! tracing filesystem.

pub(crate) mod btf;
pub(crate) mod tracefs;
