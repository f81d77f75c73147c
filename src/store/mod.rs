//! Aggregate Store module
//!
//! Durable keyed storage of one [`TrainerAggregate`] per trainer.
//! Every save replaces the whole aggregate and is conditional on the
//! aggregate's version (optimistic concurrency).

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::aggregate::{MonthlyWorkload, TrainerAggregate};

pub use error::StoreError;
pub use memory::InMemoryWorkloadStore;
pub use postgres::PgWorkloadStore;

/// Read/write contract of the aggregate store
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Load the aggregate for a trainer
    async fn find_by_username(&self, username: &str) -> Result<Option<TrainerAggregate>, StoreError>;

    /// Load a single month for a trainer
    async fn find_month(
        &self,
        username: &str,
        year: i32,
        month: u32,
    ) -> Result<Option<MonthlyWorkload>, StoreError> {
        Ok(self
            .find_by_username(username)
            .await?
            .and_then(|aggregate| aggregate.monthly(year, month)))
    }

    /// Upsert the whole aggregate.
    ///
    /// Succeeds only if the stored version still equals `aggregate.version()`
    /// (0 meaning "not stored yet"). Returns the new version.
    async fn save(&self, aggregate: &TrainerAggregate) -> Result<i64, StoreError>;
}
