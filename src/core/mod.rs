//! # Core
//!
//! Core module, providing tools and common logic that can be used by any module
//! within the tool.

pub(crate) mod inspect;
pub(crate) mod pattern;
pub(crate) mod probe;
pub(crate) mod user;
