//! Ingestion Pipeline
//!
//! Turns one delivery from the ingestion queue into an engine call.
//!
//! ```text
//! RECEIVED -> VALIDATING -> REJECTED (dead-lettered, acked)
//!                        -> PROCESSING -> APPLIED (acked)
//!                                      -> PROCESSING_FAILED (dead-lettered, acked)
//!                                      -> REDELIVER (nacked)
//! ```
//!
//! Every delivery ends in exactly one of those states; nothing is dropped.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::aggregate::TrainerProfile;
use crate::domain::message::HEADER_CORRELATION_ID;
use crate::domain::{ChangeEvent, MessageType, OperationContext, OperationSource};
use crate::engine::{
    AccumulateWorkloadCommand, ReplaceWorkloadCommand, WorkloadChange, WorkloadEngine,
    WorkloadError, WorkloadKey,
};

use super::broker::{BrokerError, Delivery, MessageBroker};
use super::validator::{validate, VIOLATION_SEPARATOR};

/// Reason recorded for a message type this service does not handle
pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type";

/// Prefix of the reason recorded for an undecodable body
pub const MALFORMED_MESSAGE: &str = "Malformed message";

/// How a CREATE_UPDATE event is applied to the stored duration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateUpdateMode {
    /// Add the event's duration to the month total
    #[default]
    Accumulate,
    /// Overwrite the month total with the event's duration
    Replace,
}

impl FromStr for CreateUpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accumulate" => Ok(Self::Accumulate),
            "replace" => Ok(Self::Replace),
            other => Err(format!("expected accumulate or replace, got '{}'", other)),
        }
    }
}

/// Terminal state of one processed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Engine call succeeded, message acked
    Applied,
    /// DELETE for an absent target, message acked
    Skipped,
    /// Copied to the dead-letter queue, original acked
    DeadLettered { reason: String },
    /// Handed back to the broker for redelivery
    Redelivered { reason: String },
}

/// Consumer logic for the ingestion queue
#[derive(Clone)]
pub struct IngestionPipeline {
    engine: WorkloadEngine,
    broker: Arc<dyn MessageBroker>,
    dead_letter_queue: String,
    mode: CreateUpdateMode,
}

impl IngestionPipeline {
    pub fn new(
        engine: WorkloadEngine,
        broker: Arc<dyn MessageBroker>,
        dead_letter_queue: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            broker,
            dead_letter_queue: dead_letter_queue.into(),
            mode: CreateUpdateMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CreateUpdateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> CreateUpdateMode {
        self.mode
    }

    /// Process one delivery to completion (ack, dead-letter or nack).
    ///
    /// Errors are broker failures only; engine and validation failures are
    /// expressed in the returned [`Outcome`].
    pub async fn process(&self, delivery: &Delivery) -> Result<Outcome, BrokerError> {
        let (event, context) = decode(delivery);

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                let reason = format!("{}: {}", MALFORMED_MESSAGE, e);
                return self.dead_letter(delivery, &context, reason).await;
            }
        };

        let span = tracing::info_span!(
            "ingest",
            correlation_id = %context.correlation_id,
            delivery_id = %delivery.id,
            attempt = delivery.attempt,
        );

        self.handle(delivery, event, &context).instrument(span).await
    }

    async fn handle(
        &self,
        delivery: &Delivery,
        event: Option<ChangeEvent>,
        context: &OperationContext,
    ) -> Result<Outcome, BrokerError> {
        let violations = validate(event.as_ref());
        let event = match event {
            Some(event) if violations.is_empty() => event,
            _ => {
                return self
                    .dead_letter(delivery, context, violations.join(VIOLATION_SEPARATOR))
                    .await
            }
        };

        tracing::debug!(
            correlation_id = %context.correlation_id,
            username = %event.username,
            message_type = ?event.message_type,
            "Processing change event"
        );

        let key = WorkloadKey::new(event.username.clone(), event.year, event.month_number());

        let (result, is_delete) = match event.message_type {
            Some(MessageType::CreateUpdate) => (self.create_update(&event, key, context).await, false),
            Some(MessageType::Delete) => (self.engine.delete(key, context).await, true),
            Some(MessageType::Unknown) | None => {
                return self
                    .dead_letter(delivery, context, UNKNOWN_MESSAGE_TYPE.to_string())
                    .await
            }
        };

        match result {
            Ok(change) => {
                self.broker.ack(delivery).await?;
                tracing::info!(
                    correlation_id = %context.correlation_id,
                    username = %change.username,
                    duration_minutes = change.duration_minutes,
                    "Change event applied"
                );
                Ok(Outcome::Applied)
            }
            Err(e) if is_delete && e.is_not_found() => {
                self.broker.ack(delivery).await?;
                tracing::info!(
                    correlation_id = %context.correlation_id,
                    reason = %e,
                    "Delete target absent, nothing to do"
                );
                Ok(Outcome::Skipped)
            }
            Err(e) if e.is_transient() => self.redeliver(delivery, context, e).await,
            Err(e) => self.dead_letter(delivery, context, e.to_string()).await,
        }
    }

    async fn create_update(
        &self,
        event: &ChangeEvent,
        key: WorkloadKey,
        context: &OperationContext,
    ) -> Result<WorkloadChange, WorkloadError> {
        let profile = TrainerProfile::new(
            event.first_name.clone(),
            event.last_name.clone(),
            event.active,
        );

        match self.mode {
            CreateUpdateMode::Accumulate => {
                let command = AccumulateWorkloadCommand::new(key, profile, event.duration_minutes);
                self.engine.upsert_and_add(command, context).await
            }
            CreateUpdateMode::Replace => {
                let command = ReplaceWorkloadCommand::new(key, profile, event.duration_minutes);
                self.engine.replace_duration(command, context).await
            }
        }
    }

    async fn redeliver(
        &self,
        delivery: &Delivery,
        context: &OperationContext,
        error: WorkloadError,
    ) -> Result<Outcome, BrokerError> {
        let reason = error.to_string();

        tracing::warn!(
            correlation_id = %context.correlation_id,
            attempt = delivery.attempt,
            error = %reason,
            "Transient failure, returning message to broker"
        );

        self.broker
            .nack(delivery, &reason, &context.correlation_id)
            .await?;
        Ok(Outcome::Redelivered { reason })
    }

    async fn dead_letter(
        &self,
        delivery: &Delivery,
        context: &OperationContext,
        reason: String,
    ) -> Result<Outcome, BrokerError> {
        tracing::error!(
            correlation_id = %context.correlation_id,
            delivery_id = %delivery.id,
            reason = %reason,
            "Message rejected, sending to dead-letter queue"
        );

        let dead = delivery.message.dead_lettered(&reason, &context.correlation_id);
        self.broker.publish(&self.dead_letter_queue, dead).await?;
        self.broker.ack(delivery).await?;

        Ok(Outcome::DeadLettered { reason })
    }
}

/// Correlation context of a delivery: the event's `correlationId` if
/// non-blank, else the transport header, else a fresh ID.
pub fn correlation_context(delivery: &Delivery) -> OperationContext {
    decode(delivery).1
}

fn decode(
    delivery: &Delivery,
) -> (Result<Option<ChangeEvent>, serde_json::Error>, OperationContext) {
    let event = serde_json::from_slice::<Option<ChangeEvent>>(&delivery.message.body);

    let event_id = event
        .as_ref()
        .ok()
        .and_then(Option::as_ref)
        .and_then(|e| e.correlation_id.as_deref());
    let header_id = delivery.message.header(HEADER_CORRELATION_ID);
    let context = OperationContext::resolve([event_id, header_id], OperationSource::Message);

    (event, context)
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("dead_letter_queue", &self.dead_letter_queue)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
