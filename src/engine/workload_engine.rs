//! Workload Aggregation Engine
//!
//! Sole writer of the aggregate store. Every mutation is a full
//! read-modify-write cycle on one trainer aggregate; a concurrent writer
//! makes the save fail with a version conflict, in which case the cycle is
//! re-run from a fresh load.

use std::sync::Arc;

use crate::aggregate::{validate_period, MonthlyWorkload, TrainerAggregate, TrainerProfile};
use crate::domain::{DomainError, OperationContext};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::WorkloadStore;

use super::{
    AccumulateWorkloadCommand, ReplaceWorkloadCommand, SubtractWorkloadCommand, WorkloadChange,
    WorkloadError, WorkloadKey,
};

/// Engine over a [`WorkloadStore`]
#[derive(Clone)]
pub struct WorkloadEngine {
    store: Arc<dyn WorkloadStore>,
    conflict_retry: RetryPolicy,
}

impl WorkloadEngine {
    pub fn new(store: Arc<dyn WorkloadStore>) -> Self {
        Self {
            store,
            conflict_retry: RetryPolicy::optimistic_lock(),
        }
    }

    /// Override the optimistic-lock retry policy
    pub fn with_conflict_retry(mut self, policy: RetryPolicy) -> Self {
        self.conflict_retry = policy;
        self
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Load or create the trainer, overwrite its profile and add minutes
    pub async fn upsert_and_add(
        &self,
        command: AccumulateWorkloadCommand,
        context: &OperationContext,
    ) -> Result<WorkloadChange, WorkloadError> {
        let key = &command.key;
        validate_period(key.year, key.month)?;

        let change = self
            .apply(key, Some(&command.profile), |aggregate| {
                aggregate.update_profile(&command.profile);
                aggregate.add_minutes(key.year, key.month, command.delta_minutes)
            })
            .await?;

        tracing::info!(
            correlation_id = %context.correlation_id,
            username = %key.username,
            year = key.year,
            month = key.month,
            delta_minutes = command.delta_minutes,
            total_minutes = change.duration_minutes,
            "Workload accumulated"
        );

        Ok(change)
    }

    /// Overwrite a month's minutes. The trainer must already exist.
    pub async fn replace_duration(
        &self,
        command: ReplaceWorkloadCommand,
        context: &OperationContext,
    ) -> Result<WorkloadChange, WorkloadError> {
        let key = &command.key;
        validate_period(key.year, key.month)?;

        let change = self
            .apply(key, None, |aggregate| {
                aggregate.update_profile(&command.profile);
                aggregate.replace_minutes(key.year, key.month, command.duration_minutes)?;
                Ok(command.duration_minutes)
            })
            .await?;

        tracing::info!(
            correlation_id = %context.correlation_id,
            username = %key.username,
            year = key.year,
            month = key.month,
            duration_minutes = command.duration_minutes,
            "Workload replaced"
        );

        Ok(change)
    }

    /// Remove minutes from an existing month, pruning emptied buckets
    pub async fn subtract(
        &self,
        command: SubtractWorkloadCommand,
        context: &OperationContext,
    ) -> Result<WorkloadChange, WorkloadError> {
        let key = &command.key;
        validate_period(key.year, key.month)?;

        let change = self
            .apply(key, None, |aggregate| {
                aggregate.subtract_minutes(key.year, key.month, command.delta_minutes)
            })
            .await?;

        tracing::info!(
            correlation_id = %context.correlation_id,
            username = %key.username,
            year = key.year,
            month = key.month,
            delta_minutes = command.delta_minutes,
            remaining_minutes = change.duration_minutes,
            "Workload subtracted"
        );

        Ok(change)
    }

    /// Remove a month unconditionally
    pub async fn delete(
        &self,
        key: WorkloadKey,
        context: &OperationContext,
    ) -> Result<WorkloadChange, WorkloadError> {
        let change = self
            .apply(&key, None, |aggregate| {
                let removed = aggregate.remove_month(key.year, key.month)?;
                tracing::debug!(
                    correlation_id = %context.correlation_id,
                    removed_minutes = removed.duration_minutes(),
                    "Removing month bucket"
                );
                Ok(0)
            })
            .await?;

        tracing::info!(
            correlation_id = %context.correlation_id,
            username = %key.username,
            year = key.year,
            month = key.month,
            "Workload deleted"
        );

        Ok(change)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// One month plus trainer metadata
    pub async fn get_monthly(&self, key: &WorkloadKey) -> Result<MonthlyWorkload, WorkloadError> {
        self.store
            .find_month(&key.username, key.year, key.month)
            .await?
            .ok_or_else(|| {
                DomainError::MonthNotFound {
                    username: key.username.clone(),
                    year: key.year,
                    month: key.month,
                }
                .into()
            })
    }

    /// Full aggregate for a trainer
    pub async fn get_summary(&self, username: &str) -> Result<TrainerAggregate, WorkloadError> {
        self.store
            .find_by_username(username)
            .await?
            .ok_or_else(|| DomainError::trainer_not_found(username).into())
    }

    // =========================================================================
    // Read-modify-write
    // =========================================================================

    /// Load (or create with `create_with`), mutate, save; re-run on conflict.
    ///
    /// `mutate` returns the month's resulting duration.
    async fn apply<F>(
        &self,
        key: &WorkloadKey,
        create_with: Option<&TrainerProfile>,
        mutate: F,
    ) -> Result<WorkloadChange, WorkloadError>
    where
        F: Fn(&mut TrainerAggregate) -> Result<i64, DomainError> + Sync,
    {
        let mutate = &mutate;

        retry_with_backoff(&self.conflict_retry, WorkloadError::is_conflict, move |_attempt| async move {
            let mut aggregate = match self.store.find_by_username(&key.username).await? {
                Some(existing) => existing,
                None => match create_with {
                    Some(profile) => TrainerAggregate::new(key.username.clone(), profile),
                    None => return Err(DomainError::trainer_not_found(&key.username).into()),
                },
            };

            let duration = mutate(&mut aggregate)?;
            let version = self.store.save(&aggregate).await?;

            Ok::<_, WorkloadError>(WorkloadChange::new(key, duration, version))
        })
        .await
    }
}

impl std::fmt::Debug for WorkloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadEngine")
            .field("conflict_retry", &self.conflict_retry)
            .finish_non_exhaustive()
    }
}
