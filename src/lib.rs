//! Trainer Workload Library
//!
//! Re-exports modules for the service binary, integration testing and the
//! load test tool.

pub mod aggregate;
pub mod api;
pub mod domain;
pub mod engine;
pub mod messaging;
pub mod retry;
pub mod store;
pub mod workers;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, ErrorResponse};
pub use domain::{ChangeEvent, DomainError, MessageType, OperationContext, OperationSource};
pub use engine::{WorkloadEngine, WorkloadError};
