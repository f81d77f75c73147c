//! In-memory aggregate store for tests/dev.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::aggregate::TrainerAggregate;

use super::{StoreError, WorkloadStore};

/// Map-backed store with the same versioning rules as the database adapter
#[derive(Debug, Default)]
pub struct InMemoryWorkloadStore {
    aggregates: RwLock<HashMap<String, TrainerAggregate>>,
}

impl InMemoryWorkloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trainers
    pub async fn len(&self) -> usize {
        self.aggregates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.aggregates.read().await.is_empty()
    }
}

#[async_trait]
impl WorkloadStore for InMemoryWorkloadStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<TrainerAggregate>, StoreError> {
        Ok(self.aggregates.read().await.get(username).cloned())
    }

    async fn save(&self, aggregate: &TrainerAggregate) -> Result<i64, StoreError> {
        let mut aggregates = self.aggregates.write().await;

        let current = aggregates
            .get(aggregate.username())
            .map(TrainerAggregate::version)
            .unwrap_or(0);

        if current != aggregate.version() {
            return Err(StoreError::ConcurrencyConflict {
                username: aggregate.username().to_string(),
                expected: aggregate.version(),
                actual: current,
            });
        }

        let new_version = current + 1;
        let mut stored = aggregate.clone();
        stored.set_version(new_version);
        aggregates.insert(stored.username().to_string(), stored);

        Ok(new_version)
    }
}
