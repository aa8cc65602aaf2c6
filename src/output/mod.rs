//! Output module for reporting on the local store
//!
//! This module handles the summary printed by the `stats` command.

pub mod stats;

pub use stats::{load_statistics, print_statistics, StoreStatistics};
