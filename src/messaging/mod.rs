//! Messaging module
//!
//! Asynchronous ingestion of workload change-events: broker abstraction,
//! event validation, the ingestion pipeline and the dead-letter handler.

pub mod broker;
pub mod dead_letter;
pub mod pipeline;
pub mod validator;

pub use broker::{BrokerError, Delivery, InMemoryBroker, Message, MessageBroker};
pub use dead_letter::{DeadLetterHandler, DeadLetterRecord};
pub use pipeline::{correlation_context, CreateUpdateMode, IngestionPipeline, Outcome};
pub use validator::validate;
