//! Message Broker
//!
//! Queue abstraction consumed by the ingestion pipeline and the dead-letter
//! handler, plus an in-process implementation.
//!
//! Delivery semantics are at-least-once: a received message stays in flight
//! until it is acked or nacked. A nack hands the message back to the
//! broker's redelivery policy; once attempts are exhausted the broker moves
//! it to the dead-letter queue itself. A delivery left unsettled past the
//! visibility timeout is reclaimed as if it had been nacked.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use crate::domain::message::{
    HEADER_CORRELATION_ID, HEADER_ERROR_REASON, HEADER_ERROR_TIMESTAMP,
    HEADER_ORIGINAL_TRANSACTION_ID,
};
use crate::retry::RetryPolicy;

/// Prefix of the reason recorded when the broker gives up on a message
pub const REDELIVERY_EXHAUSTED: &str = "Redelivery attempts exhausted";

/// Reason recorded for a delivery reclaimed from an unresponsive consumer
pub const VISIBILITY_TIMEOUT_EXPIRED: &str = "Visibility timeout expired";

/// How long a delivery may stay unsettled before it is reclaimed
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by a broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Internal lock poisoned by a panicking holder
    #[error("Broker state poisoned")]
    Poisoned,

    /// Ack/nack for a delivery that is not in flight
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(Uuid),

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =========================================================================
// Message & Delivery
// =========================================================================

/// Payload bytes plus string headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Encode `value` as a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self, BrokerError> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Copy of this message routed to a dead-letter queue with failure metadata
    pub fn dead_lettered(&self, reason: &str, correlation_id: &str) -> Self {
        self.clone()
            .with_header(HEADER_ERROR_REASON, reason)
            .with_header(HEADER_ORIGINAL_TRANSACTION_ID, correlation_id)
            .with_header(HEADER_ERROR_TIMESTAMP, Utc::now().timestamp_millis().to_string())
    }
}

/// One attempt at handing a queued message to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub queue: String,
    pub message: Message,
    /// 1 for the first delivery, incremented on each redelivery
    pub attempt: u32,
}

/// Queue operations used by consumers and producers
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Append a message to a queue
    async fn publish(&self, queue: &str, message: Message) -> Result<(), BrokerError>;

    /// Wait up to `timeout` for the next message. `None` on timeout.
    async fn receive(&self, queue: &str, timeout: Duration) -> Result<Option<Delivery>, BrokerError>;

    /// Settle a delivery as done
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Return a delivery for redelivery after a transport-level failure
    async fn nack(
        &self,
        delivery: &Delivery,
        reason: &str,
        correlation_id: &str,
    ) -> Result<(), BrokerError>;

    /// Messages ready for delivery on a queue
    async fn pending(&self, queue: &str) -> Result<usize, BrokerError>;
}

// =========================================================================
// InMemoryBroker
// =========================================================================

#[derive(Debug, Clone)]
struct Envelope {
    id: Uuid,
    queue: String,
    message: Message,
    deliveries: u32,
}

#[derive(Debug)]
struct InFlight {
    envelope: Envelope,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: HashMap<String, VecDeque<Envelope>>,
    in_flight: HashMap<Uuid, InFlight>,
    /// Nacked envelopes waiting out their redelivery delay
    scheduled: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl QueueState {
    fn push_ready(&mut self, envelope: Envelope) {
        self.ready
            .entry(envelope.queue.clone())
            .or_default()
            .push_back(envelope);
    }
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, BrokerError> {
        self.state.lock().map_err(|_| BrokerError::Poisoned)
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), BrokerError> {
        self.lock()?.push_ready(envelope);
        self.notify.notify_waiters();
        Ok(())
    }

    fn requeue(&self, envelope: Envelope) -> Result<(), BrokerError> {
        {
            let mut state = self.lock()?;
            state.scheduled = state.scheduled.saturating_sub(1);
            state.push_ready(envelope);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

/// In-process broker with redelivery and dead-lettering
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    redelivery: RetryPolicy,
    dead_letter_queue: String,
    visibility_timeout: Duration,
}

impl InMemoryBroker {
    pub fn new(redelivery: RetryPolicy, dead_letter_queue: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            redelivery,
            dead_letter_queue: dead_letter_queue.into(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter_queue
    }

    /// Deliveries received but not yet settled
    pub fn in_flight(&self) -> Result<usize, BrokerError> {
        Ok(self.shared.lock()?.in_flight.len())
    }

    /// Nacked deliveries not yet back on their queue
    pub fn scheduled(&self) -> Result<usize, BrokerError> {
        Ok(self.shared.lock()?.scheduled)
    }

    /// Move expired in-flight deliveries back to their queue, or to the
    /// dead-letter queue once attempts are exhausted. Returns how many moved.
    fn reclaim_expired(&self, state: &mut QueueState) -> usize {
        let now = Instant::now();
        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            let Some(InFlight { envelope, .. }) = state.in_flight.remove(id) else {
                continue;
            };

            if self.redelivery.allows_retry(envelope.deliveries) {
                tracing::warn!(
                    delivery_id = %envelope.id,
                    queue = %envelope.queue,
                    attempt = envelope.deliveries,
                    "Unsettled delivery reclaimed for redelivery"
                );
                state.push_ready(envelope);
                continue;
            }

            let reason = format!("{}: {}", REDELIVERY_EXHAUSTED, VISIBILITY_TIMEOUT_EXPIRED);
            let correlation_id = envelope
                .message
                .header(HEADER_CORRELATION_ID)
                .map(str::to_string)
                .unwrap_or_else(|| envelope.id.to_string());

            tracing::warn!(
                correlation_id = %correlation_id,
                delivery_id = %envelope.id,
                queue = %envelope.queue,
                attempts = envelope.deliveries,
                "Unsettled delivery exhausted its attempts, dead-lettering"
            );

            state.push_ready(Envelope {
                id: Uuid::new_v4(),
                queue: self.dead_letter_queue.clone(),
                message: envelope.message.dead_lettered(&reason, &correlation_id),
                deliveries: 0,
            });
        }

        expired.len()
    }

    fn take(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.shared.lock()?;

        if self.reclaim_expired(&mut state) > 0 {
            self.shared.notify.notify_waiters();
        }

        let Some(mut envelope) = state.ready.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        envelope.deliveries += 1;

        let delivery = Delivery {
            id: envelope.id,
            queue: envelope.queue.clone(),
            message: envelope.message.clone(),
            attempt: envelope.deliveries,
        };
        state.in_flight.insert(
            envelope.id,
            InFlight {
                envelope,
                expires_at: Instant::now() + self.visibility_timeout,
            },
        );

        Ok(Some(delivery))
    }

    fn settle(&self, delivery: &Delivery) -> Result<Envelope, BrokerError> {
        self.shared
            .lock()?
            .in_flight
            .remove(&delivery.id)
            .map(|entry| entry.envelope)
            .ok_or(BrokerError::UnknownDelivery(delivery.id))
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, message: Message) -> Result<(), BrokerError> {
        self.shared.enqueue(Envelope {
            id: Uuid::new_v4(),
            queue: queue.to_string(),
            message,
            deliveries: 0,
        })
    }

    async fn receive(&self, queue: &str, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a concurrent publish is not missed
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.take(queue)? {
                return Ok(Some(delivery));
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.settle(delivery)?;
        Ok(())
    }

    async fn nack(
        &self,
        delivery: &Delivery,
        reason: &str,
        correlation_id: &str,
    ) -> Result<(), BrokerError> {
        let envelope = self.settle(delivery)?;

        if !self.redelivery.allows_retry(envelope.deliveries) {
            let reason = format!("{}: {}", REDELIVERY_EXHAUSTED, reason);

            tracing::warn!(
                correlation_id = %correlation_id,
                delivery_id = %envelope.id,
                queue = %envelope.queue,
                attempts = envelope.deliveries,
                reason = %reason,
                "Redelivery attempts exhausted, dead-lettering"
            );

            return self.shared.enqueue(Envelope {
                id: Uuid::new_v4(),
                queue: self.dead_letter_queue.clone(),
                message: envelope.message.dead_lettered(&reason, correlation_id),
                deliveries: 0,
            });
        }

        let delay = self.redelivery.delay_for(envelope.deliveries);

        tracing::debug!(
            correlation_id = %correlation_id,
            delivery_id = %envelope.id,
            attempt = envelope.deliveries,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Scheduling redelivery"
        );

        self.shared.lock()?.scheduled += 1;

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let id = envelope.id;
            if let Err(e) = shared.requeue(envelope) {
                tracing::error!(delivery_id = %id, error = %e, "Failed to requeue delivery");
            }
        });

        Ok(())
    }

    async fn pending(&self, queue: &str) -> Result<usize, BrokerError> {
        Ok(self
            .shared
            .lock()?
            .ready
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0))
    }
}
