//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use trainer_workload::messaging::{InMemoryBroker, IngestionPipeline, MessageBroker};
use trainer_workload::retry::RetryPolicy;
use trainer_workload::store::{InMemoryWorkloadStore, WorkloadStore};
use trainer_workload::WorkloadEngine;

pub const QUEUE: &str = "trainer.workload";
pub const DLQ: &str = "trainer.workload.dlq";

/// Redelivery policy with millisecond delays
pub fn fast_redelivery(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        multiplier: 2.0,
    }
}

/// Engine, broker and pipeline wired over one store
pub struct TestHarness {
    pub store: Arc<dyn WorkloadStore>,
    pub engine: WorkloadEngine,
    pub broker: Arc<InMemoryBroker>,
    pub pipeline: IngestionPipeline,
}

impl TestHarness {
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryWorkloadStore::new()), fast_redelivery(3))
    }

    pub fn with_store(store: Arc<dyn WorkloadStore>, redelivery: RetryPolicy) -> Self {
        let engine = WorkloadEngine::new(store.clone()).with_conflict_retry(RetryPolicy {
            max_attempts: 50,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        });
        let broker = Arc::new(InMemoryBroker::new(redelivery, DLQ));
        let pipeline = IngestionPipeline::new(engine.clone(), broker.clone(), DLQ);

        Self {
            store,
            engine,
            broker,
            pipeline,
        }
    }

    pub fn broker_dyn(&self) -> Arc<dyn MessageBroker> {
        self.broker.clone()
    }
}

/// Connect to the test database.
///
/// Returns `None` when DATABASE_URL is not set so database tests can skip.
/// Tests share the database and must use [`unique_username`].
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    Some(pool)
}

/// Username no other test run will collide with
pub fn unique_username(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}
