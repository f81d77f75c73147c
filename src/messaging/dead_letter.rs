//! Dead-Letter Handler
//!
//! Observability sink for the dead-letter queue. Each message is logged with
//! its failure metadata and acknowledged; nothing is reprocessed.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::message::{
    HEADER_ERROR_REASON, HEADER_ERROR_TIMESTAMP, HEADER_ORIGINAL_TRANSACTION_ID,
};

use super::broker::{BrokerError, Delivery, MessageBroker};

/// What was logged for one dead-lettered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetterRecord {
    pub delivery_id: Uuid,
    pub reason: Option<String>,
    pub original_correlation_id: Option<String>,
    /// Parsed `error.timestamp`; `None` when missing or malformed
    pub error_timestamp: Option<DateTime<Utc>>,
    pub raw_timestamp: Option<String>,
    pub payload: String,
}

impl DeadLetterRecord {
    pub fn from_delivery(delivery: &Delivery) -> Self {
        let header = |name: &str| delivery.message.header(name).map(str::to_string);
        let raw_timestamp = header(HEADER_ERROR_TIMESTAMP);

        Self {
            delivery_id: delivery.id,
            reason: header(HEADER_ERROR_REASON),
            original_correlation_id: header(HEADER_ORIGINAL_TRANSACTION_ID),
            error_timestamp: raw_timestamp.as_deref().and_then(parse_epoch_millis),
            raw_timestamp,
            payload: String::from_utf8_lossy(&delivery.message.body).into_owned(),
        }
    }
}

fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Consumer of the dead-letter queue
#[derive(Clone)]
pub struct DeadLetterHandler {
    broker: Arc<dyn MessageBroker>,
}

impl DeadLetterHandler {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    /// Log and acknowledge one dead-lettered message
    pub async fn handle(&self, delivery: &Delivery) -> Result<DeadLetterRecord, BrokerError> {
        let record = DeadLetterRecord::from_delivery(delivery);

        if record.error_timestamp.is_none() {
            tracing::warn!(
                delivery_id = %record.delivery_id,
                raw_timestamp = ?record.raw_timestamp,
                "Dead-letter message has a missing or malformed error timestamp"
            );
        }

        tracing::error!(
            delivery_id = %record.delivery_id,
            original_correlation_id = record.original_correlation_id.as_deref().unwrap_or("unknown"),
            reason = record.reason.as_deref().unwrap_or("unknown"),
            error_timestamp = ?record.error_timestamp.map(|ts| ts.to_rfc3339()),
            payload = %record.payload,
            "Dead-lettered message"
        );

        self.broker.ack(delivery).await?;
        Ok(record)
    }
}
