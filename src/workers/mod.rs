//! Background Workers
//!
//! Long-running consumers of the broker queues:
//! - [`WorkerPool`]: ingestion-queue consumers, scaled between a minimum and
//!   maximum number of tasks by a supervisor.
//! - [`DeadLetterWorker`]: single consumer of the dead-letter queue.
//!
//! Both stop when the shared watch channel flips to `true`; a worker always
//! finishes the delivery it is processing before exiting.
//!
//! Each ingestion delivery is processed in its own task. A panic there is
//! nacked like any other failure and the worker keeps consuming.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::interval;

use crate::messaging::{
    correlation_context, DeadLetterHandler, Delivery, IngestionPipeline, MessageBroker,
};

// =========================================================================
// Worker Pool
// =========================================================================

/// Configuration for the ingestion worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Workers kept alive at all times
    pub min_workers: usize,
    /// Upper bound on concurrent workers
    pub max_workers: usize,
    /// Bounded wait of a single receive
    pub receive_timeout: Duration,
    /// How often the supervisor checks the backlog
    pub scale_interval: Duration,
    /// Consecutive empty receives before a surplus worker retires
    pub idle_receives_before_retire: u32,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 3,
            max_workers: 10,
            receive_timeout: Duration::from_millis(1000),
            scale_interval: Duration::from_millis(500),
            idle_receives_before_retire: 5,
        }
    }
}

/// Supervised set of ingestion consumers
pub struct WorkerPool {
    pipeline: IngestionPipeline,
    broker: Arc<dyn MessageBroker>,
    queue: String,
    config: WorkerPoolConfig,
    active: Arc<AtomicUsize>,
}

/// Handle to a running pool
#[derive(Debug)]
pub struct WorkerPoolHandle {
    supervisor: JoinHandle<()>,
    active: Arc<AtomicUsize>,
}

impl WorkerPoolHandle {
    /// Workers currently running
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for the supervisor and all workers to stop
    pub async fn join(self) {
        if let Err(e) = self.supervisor.await {
            tracing::error!(error = %e, "Worker pool supervisor failed");
        }
    }
}

impl WorkerPool {
    pub fn new(
        pipeline: IngestionPipeline,
        broker: Arc<dyn MessageBroker>,
        queue: impl Into<String>,
    ) -> Self {
        Self::with_config(pipeline, broker, queue, WorkerPoolConfig::default())
    }

    pub fn with_config(
        pipeline: IngestionPipeline,
        broker: Arc<dyn MessageBroker>,
        queue: impl Into<String>,
        config: WorkerPoolConfig,
    ) -> Self {
        let max_workers = config.max_workers.max(config.min_workers).max(1);
        Self {
            pipeline,
            broker,
            queue: queue.into(),
            config: WorkerPoolConfig {
                max_workers,
                ..config
            },
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the supervisor in the background
    pub fn start(self, shutdown: watch::Receiver<bool>) -> WorkerPoolHandle {
        let active = Arc::clone(&self.active);
        let supervisor = tokio::spawn(async move {
            self.run(shutdown).await;
        });

        WorkerPoolHandle { supervisor, active }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue = %self.queue,
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            "Worker pool started"
        );

        let mut workers = JoinSet::new();
        for _ in 0..self.config.min_workers.max(1) {
            self.spawn_worker(&mut workers, &shutdown);
        }

        let mut scale_interval = interval(self.config.scale_interval);

        loop {
            tokio::select! {
                _ = scale_interval.tick() => {
                    self.scale(&mut workers, &shutdown).await;
                    while let Some(finished) = workers.try_join_next() {
                        if let Err(e) = finished {
                            tracing::error!(error = %e, "Worker task failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(queue = %self.queue, "Worker pool stopping, draining workers");

        while let Some(finished) = workers.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        tracing::info!(queue = %self.queue, "Worker pool stopped");
    }

    /// Add one worker when the backlog exceeds the active worker count
    async fn scale(&self, workers: &mut JoinSet<()>, shutdown: &watch::Receiver<bool>) {
        let backlog = match self.broker.pending(&self.queue).await {
            Ok(backlog) => backlog,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read queue backlog");
                return;
            }
        };

        let active = self.active.load(Ordering::SeqCst);
        if backlog > active && active < self.config.max_workers {
            tracing::debug!(backlog = backlog, active = active, "Scaling up worker pool");
            self.spawn_worker(workers, shutdown);
        } else if active < self.config.min_workers {
            self.spawn_worker(workers, shutdown);
        }
    }

    fn spawn_worker(&self, workers: &mut JoinSet<()>, shutdown: &watch::Receiver<bool>) {
        let (id, slot) = ActiveSlot::acquire(&self.active);
        let worker = IngestionWorker {
            id,
            pipeline: self.pipeline.clone(),
            broker: Arc::clone(&self.broker),
            queue: self.queue.clone(),
            receive_timeout: self.config.receive_timeout,
            idle_receives_before_retire: self.config.idle_receives_before_retire,
            min_workers: self.config.min_workers,
            slot,
        };
        workers.spawn(worker.run(shutdown.clone()));
    }
}

struct IngestionWorker {
    id: usize,
    pipeline: IngestionPipeline,
    broker: Arc<dyn MessageBroker>,
    queue: String,
    receive_timeout: Duration,
    idle_receives_before_retire: u32,
    min_workers: usize,
    slot: ActiveSlot,
}

/// One unit of the pool's active count, returned when dropped
struct ActiveSlot {
    active: Arc<AtomicUsize>,
    held: bool,
}

impl ActiveSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> (usize, Self) {
        let id = active.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = Self {
            active: Arc::clone(active),
            held: true,
        };
        (id, slot)
    }

    /// Give the slot back only if the count stays at or above `min`
    fn try_release_above(&mut self, min: usize) -> bool {
        if !self.held {
            return true;
        }
        let released = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active > min).then(|| active - 1)
            })
            .is_ok();
        if released {
            self.held = false;
        }
        released
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        if self.held {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl IngestionWorker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(worker = self.id, "Worker started");
        let mut idle_receives = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                received = self.broker.receive(&self.queue, self.receive_timeout) => received,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match received {
                Ok(Some(delivery)) => {
                    idle_receives = 0;
                    self.process(delivery).await;
                }
                Ok(None) => {
                    idle_receives += 1;
                    if idle_receives >= self.idle_receives_before_retire && self.try_retire() {
                        tracing::debug!(worker = self.id, "Idle worker retired");
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(worker = self.id, error = %e, "Receive failed");
                    tokio::time::sleep(self.receive_timeout).await;
                }
            }
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, delivery: Delivery) {
        let task = {
            let pipeline = self.pipeline.clone();
            let delivery = delivery.clone();
            tokio::spawn(async move { pipeline.process(&delivery).await })
        };

        let reason = match task.await {
            Ok(Ok(outcome)) => {
                tracing::debug!(worker = self.id, delivery_id = %delivery.id, outcome = ?outcome, "Delivery settled");
                return;
            }
            Ok(Err(e)) => {
                tracing::error!(worker = self.id, delivery_id = %delivery.id, error = %e, "Pipeline failed to settle delivery");
                e.to_string()
            }
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(worker = self.id, delivery_id = %delivery.id, panic = %message, "Delivery processing panicked");
                format!("Processing panicked: {}", message)
            }
            Err(e) => {
                tracing::error!(worker = self.id, delivery_id = %delivery.id, error = %e, "Delivery processing cancelled");
                "Processing task cancelled".to_string()
            }
        };

        let context = correlation_context(&delivery);
        if let Err(e) = self
            .broker
            .nack(&delivery, &reason, &context.correlation_id)
            .await
        {
            tracing::error!(worker = self.id, error = %e, "Failed to nack delivery");
        }
    }

    /// Leave the pool if that keeps it at or above the minimum
    fn try_retire(&mut self) -> bool {
        self.slot.try_release_above(self.min_workers)
    }
}

// =========================================================================
// Dead-Letter Worker
// =========================================================================

/// Single consumer of the dead-letter queue
pub struct DeadLetterWorker {
    handler: DeadLetterHandler,
    broker: Arc<dyn MessageBroker>,
    queue: String,
    receive_timeout: Duration,
}

impl DeadLetterWorker {
    pub fn new(
        handler: DeadLetterHandler,
        broker: Arc<dyn MessageBroker>,
        queue: impl Into<String>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            handler,
            broker,
            queue: queue.into(),
            receive_timeout,
        }
    }

    /// Start the consumer in the background
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = %self.queue, "Dead-letter consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                received = self.broker.receive(&self.queue, self.receive_timeout) => received,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match received {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.handler.handle(&delivery).await {
                        tracing::error!(delivery_id = %delivery.id, error = %e, "Failed to acknowledge dead letter");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Dead-letter receive failed");
                    tokio::time::sleep(self.receive_timeout).await;
                }
            }
        }

        tracing::info!(queue = %self.queue, "Dead-letter consumer stopped");
    }
}
