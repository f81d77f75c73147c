//! PostgreSQL aggregate store
//!
//! Relational layout: `trainers` (one row per aggregate, carries the version),
//! `trainer_years` and `trainer_months` as child tables. A save rewrites the
//! child rows inside one transaction guarded by the version check.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::aggregate::{MonthBucket, MonthlyWorkload, TrainerAggregate, TrainerProfile, YearBucket};

use super::{StoreError, WorkloadStore};

/// Aggregate store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgWorkloadStore {
    pool: PgPool,
}

impl PgWorkloadStore {
    /// Create a new store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current stored version, 0 when the trainer row does not exist
    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        username: &str,
    ) -> Result<i64, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM trainers WHERE username = $1")
                .bind(username)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(version.unwrap_or(0))
    }

    async fn write_root(
        tx: &mut Transaction<'_, Postgres>,
        aggregate: &TrainerAggregate,
    ) -> Result<i64, StoreError> {
        let rows = if aggregate.is_new() {
            sqlx::query(
                r#"
                INSERT INTO trainers (username, first_name, last_name, active, version)
                VALUES ($1, $2, $3, $4, 1)
                ON CONFLICT (username) DO NOTHING
                "#,
            )
            .bind(aggregate.username())
            .bind(aggregate.first_name())
            .bind(aggregate.last_name())
            .bind(aggregate.is_active())
            .execute(&mut **tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE trainers
                SET first_name = $2, last_name = $3, active = $4,
                    version = version + 1, updated_at = NOW()
                WHERE username = $1 AND version = $5
                "#,
            )
            .bind(aggregate.username())
            .bind(aggregate.first_name())
            .bind(aggregate.last_name())
            .bind(aggregate.is_active())
            .bind(aggregate.version())
            .execute(&mut **tx)
            .await?
            .rows_affected()
        };

        if rows == 0 {
            let actual = Self::current_version(tx, aggregate.username()).await?;
            return Err(StoreError::ConcurrencyConflict {
                username: aggregate.username().to_string(),
                expected: aggregate.version(),
                actual,
            });
        }

        Ok(aggregate.version() + 1)
    }

    async fn write_buckets(
        tx: &mut Transaction<'_, Postgres>,
        aggregate: &TrainerAggregate,
    ) -> Result<(), StoreError> {
        // Months go with their year rows (ON DELETE CASCADE)
        sqlx::query("DELETE FROM trainer_years WHERE username = $1")
            .bind(aggregate.username())
            .execute(&mut **tx)
            .await?;

        for (position, year) in aggregate.years().iter().enumerate() {
            let year_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO trainer_years (username, year, position)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
            )
            .bind(aggregate.username())
            .bind(year.year())
            .bind(position as i32)
            .fetch_one(&mut **tx)
            .await?;

            for month in year.months() {
                let month_number = i16::try_from(month.month())
                    .map_err(|_| StoreError::InvalidData(format!("month {}", month.month())))?;

                sqlx::query(
                    r#"
                    INSERT INTO trainer_months (year_id, month, duration_minutes)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(year_id)
                .bind(month_number)
                .bind(month.duration_minutes())
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }
}

fn month_from_row(month: i16) -> Result<u32, StoreError> {
    u32::try_from(month)
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| StoreError::InvalidData(format!("month {}", month)))
}

#[async_trait]
impl WorkloadStore for PgWorkloadStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<TrainerAggregate>, StoreError> {
        // Root, years and months must come from one snapshot; a concurrent
        // save recreates year rows under new ids.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let root: Option<(String, String, bool, i64)> = sqlx::query_as(
            r#"
            SELECT first_name, last_name, active, version
            FROM trainers
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((first_name, last_name, active, version)) = root else {
            return Ok(None);
        };

        let year_rows: Vec<(i64, i32)> = sqlx::query_as(
            r#"
            SELECT id, year
            FROM trainer_years
            WHERE username = $1
            ORDER BY position ASC
            "#,
        )
        .bind(username)
        .fetch_all(&mut *tx)
        .await?;

        let month_rows: Vec<(i64, i16, i64)> = sqlx::query_as(
            r#"
            SELECT m.year_id, m.month, m.duration_minutes
            FROM trainer_months m
            JOIN trainer_years y ON y.id = m.year_id
            WHERE y.username = $1
            ORDER BY m.id ASC
            "#,
        )
        .bind(username)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut years = Vec::with_capacity(year_rows.len());
        for (year_id, year) in year_rows {
            let mut months = Vec::new();
            for (_, month, duration) in month_rows.iter().filter(|(id, _, _)| *id == year_id) {
                months.push(MonthBucket::new(month_from_row(*month)?, *duration));
            }
            if months.is_empty() {
                return Err(StoreError::InvalidData(format!("year {} has no months", year)));
            }
            years.push(YearBucket::new(year, months));
        }

        Ok(Some(TrainerAggregate::from_db_state(
            username.to_string(),
            TrainerProfile::new(first_name, last_name, active),
            years,
            version,
        )))
    }

    async fn find_month(
        &self,
        username: &str,
        year: i32,
        month: u32,
    ) -> Result<Option<MonthlyWorkload>, StoreError> {
        let Ok(month_number) = i16::try_from(month) else {
            return Ok(None);
        };

        let row: Option<(String, String, bool, i64)> = sqlx::query_as(
            r#"
            SELECT t.first_name, t.last_name, t.active, m.duration_minutes
            FROM trainers t
            JOIN trainer_years y ON y.username = t.username
            JOIN trainer_months m ON m.year_id = y.id
            WHERE t.username = $1 AND y.year = $2 AND m.month = $3
            "#,
        )
        .bind(username)
        .bind(year)
        .bind(month_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(first_name, last_name, active, duration_minutes)| MonthlyWorkload {
            username: username.to_string(),
            first_name,
            last_name,
            active,
            year,
            month,
            duration_minutes,
        }))
    }

    async fn save(&self, aggregate: &TrainerAggregate) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let new_version = Self::write_root(&mut tx, aggregate).await?;
        Self::write_buckets(&mut tx, aggregate).await?;

        tx.commit().await?;

        tracing::debug!(
            username = %aggregate.username(),
            version = new_version,
            years = aggregate.years().len(),
            "Saved trainer aggregate"
        );

        Ok(new_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_from_row() {
        assert_eq!(month_from_row(1).unwrap(), 1);
        assert_eq!(month_from_row(12).unwrap(), 12);
        assert!(matches!(month_from_row(0), Err(StoreError::InvalidData(_))));
        assert!(matches!(month_from_row(-3), Err(StoreError::InvalidData(_))));
        assert!(matches!(month_from_row(13), Err(StoreError::InvalidData(_))));
    }
}
