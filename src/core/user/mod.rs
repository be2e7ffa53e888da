//! # User
//!
//! Provides user-space inspection: processes, their namespaces and the ELF
//! binaries they run.

pub(crate) mod elf;
pub(crate) mod proc;
