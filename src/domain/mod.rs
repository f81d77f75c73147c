//! Domain module
//!
//! Core domain types: errors, operation context and the change-event contract.

pub mod context;
pub mod error;
pub mod message;

pub use context::{OperationContext, OperationSource};
pub use error::DomainError;
pub use message::{ChangeEvent, MessageType};
