//! # Helpers
//!
//! Helpers not fitting in other modules.

pub(crate) mod logger;
