//! Workload Engine module
//!
//! Command handling for trainer workloads: validates periods and durations,
//! applies the change to the trainer aggregate and persists it.

mod commands;
mod error;
mod workload_engine;


pub use commands::*;
pub use error::WorkloadError;
pub use workload_engine::WorkloadEngine;
