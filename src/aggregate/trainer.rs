//! Trainer Aggregate
//!
//! One aggregate per trainer holding the year → month → minutes tree.
//! Buckets are owned by value; every mutation keeps the pruning invariants:
//! no month with zero minutes and no year without months.

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Profile fields overwritten on every create/update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerProfile {
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
}

impl TrainerProfile {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, active: bool) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            active,
        }
    }
}

/// Minutes recorded for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    month: u32,
    duration_minutes: i64,
}

impl MonthBucket {
    pub fn new(month: u32, duration_minutes: i64) -> Self {
        Self {
            month,
            duration_minutes,
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }
}

/// Month buckets recorded for one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBucket {
    year: i32,
    months: Vec<MonthBucket>,
}

impl YearBucket {
    pub fn new(year: i32, months: Vec<MonthBucket>) -> Self {
        Self { year, months }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn months(&self) -> &[MonthBucket] {
        &self.months
    }

    pub fn month(&self, month: u32) -> Option<&MonthBucket> {
        self.months.iter().find(|m| m.month == month)
    }

    pub fn total_minutes(&self) -> i64 {
        self.months.iter().map(|m| m.duration_minutes).sum()
    }

    fn month_mut(&mut self, month: u32) -> Option<&mut MonthBucket> {
        self.months.iter_mut().find(|m| m.month == month)
    }

    fn month_or_insert(&mut self, month: u32) -> &mut MonthBucket {
        let index = match self.months.iter().position(|m| m.month == month) {
            Some(index) => index,
            None => {
                self.months.push(MonthBucket::new(month, 0));
                self.months.len() - 1
            }
        };
        &mut self.months[index]
    }

    fn remove_month(&mut self, month: u32) -> Option<MonthBucket> {
        let index = self.months.iter().position(|m| m.month == month)?;
        Some(self.months.remove(index))
    }
}

/// One month's duration together with the owning trainer's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyWorkload {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub year: i32,
    pub month: u32,
    pub duration_minutes: i64,
}

/// Trainer Aggregate
///
/// `version` is the optimistic-concurrency counter maintained by the store:
/// 0 until the first save, incremented by each successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerAggregate {
    username: String,
    first_name: String,
    last_name: String,
    active: bool,
    years: Vec<YearBucket>,
    version: i64,
}

/// Reject periods outside year >= 1, month 1..=12
pub fn validate_period(year: i32, month: u32) -> Result<(), DomainError> {
    if year < 1 || !(1..=12).contains(&month) {
        return Err(DomainError::InvalidPeriod { year, month });
    }
    Ok(())
}

impl TrainerAggregate {
    /// Create an empty, never-saved aggregate
    pub fn new(username: impl Into<String>, profile: &TrainerProfile) -> Self {
        Self {
            username: username.into(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            active: profile.active,
            years: Vec::new(),
            version: 0,
        }
    }

    /// Rebuild an aggregate from persisted state
    pub fn from_db_state(
        username: String,
        profile: TrainerProfile,
        years: Vec<YearBucket>,
        version: i64,
    ) -> Self {
        Self {
            username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            active: profile.active,
            years,
            version,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Overwrite the denormalized profile fields
    pub fn update_profile(&mut self, profile: &TrainerProfile) {
        self.first_name = profile.first_name.clone();
        self.last_name = profile.last_name.clone();
        self.active = profile.active;
    }

    /// Add minutes to a month, creating year/month buckets as needed.
    /// Returns the new month total.
    pub fn add_minutes(&mut self, year: i32, month: u32, delta: i64) -> Result<i64, DomainError> {
        validate_period(year, month)?;
        if delta <= 0 {
            return Err(DomainError::InvalidDuration(format!(
                "delta must be positive, got {}",
                delta
            )));
        }

        let bucket = self.year_or_insert(year).month_or_insert(month);
        let total = bucket
            .duration_minutes
            .checked_add(delta)
            .ok_or_else(|| DomainError::InvalidDuration("duration overflow".to_string()))?;
        bucket.duration_minutes = total;
        Ok(total)
    }

    /// Set a month's minutes. Zero removes the month (and an emptied year).
    pub fn replace_minutes(&mut self, year: i32, month: u32, minutes: i64) -> Result<(), DomainError> {
        validate_period(year, month)?;
        if minutes < 0 {
            return Err(DomainError::InvalidDuration(format!(
                "duration must not be negative, got {}",
                minutes
            )));
        }

        if minutes == 0 {
            if let Some(bucket) = self.year_mut(year) {
                bucket.remove_month(month);
            }
            self.prune_year(year);
            return Ok(());
        }

        self.year_or_insert(year).month_or_insert(month).duration_minutes = minutes;
        Ok(())
    }

    /// Subtract minutes from an existing month. Returns the remaining total.
    pub fn subtract_minutes(&mut self, year: i32, month: u32, delta: i64) -> Result<i64, DomainError> {
        validate_period(year, month)?;
        if delta <= 0 {
            return Err(DomainError::InvalidDuration(format!(
                "delta must be positive, got {}",
                delta
            )));
        }

        let username = self.username.clone();
        let bucket = self
            .year_mut(year)
            .ok_or_else(|| DomainError::YearNotFound {
                username: username.clone(),
                year,
            })?
            .month_mut(month)
            .ok_or(DomainError::MonthNotFound {
                username,
                year,
                month,
            })?;

        if delta > bucket.duration_minutes {
            return Err(DomainError::InsufficientWorkload {
                requested: delta,
                available: bucket.duration_minutes,
            });
        }

        bucket.duration_minutes -= delta;
        let remaining = bucket.duration_minutes;

        if remaining == 0 {
            if let Some(year_bucket) = self.year_mut(year) {
                year_bucket.remove_month(month);
            }
            self.prune_year(year);
        }

        Ok(remaining)
    }

    /// Remove a month regardless of its duration
    pub fn remove_month(&mut self, year: i32, month: u32) -> Result<MonthBucket, DomainError> {
        let username = self.username.clone();
        let removed = self
            .year_mut(year)
            .ok_or_else(|| DomainError::YearNotFound {
                username: username.clone(),
                year,
            })?
            .remove_month(month)
            .ok_or(DomainError::MonthNotFound {
                username,
                year,
                month,
            })?;

        self.prune_year(year);
        Ok(removed)
    }

    fn year_mut(&mut self, year: i32) -> Option<&mut YearBucket> {
        self.years.iter_mut().find(|y| y.year == year)
    }

    fn year_or_insert(&mut self, year: i32) -> &mut YearBucket {
        let index = match self.years.iter().position(|y| y.year == year) {
            Some(index) => index,
            None => {
                self.years.push(YearBucket::new(year, Vec::new()));
                self.years.len() - 1
            }
        };
        &mut self.years[index]
    }

    fn prune_year(&mut self, year: i32) {
        self.years.retain(|y| y.year != year || !y.months.is_empty());
    }

    /// Called by stores after a successful save
    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn profile(&self) -> TrainerProfile {
        TrainerProfile::new(self.first_name.clone(), self.last_name.clone(), self.active)
    }

    pub fn years(&self) -> &[YearBucket] {
        &self.years
    }

    pub fn year(&self, year: i32) -> Option<&YearBucket> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn month(&self, year: i32, month: u32) -> Option<&MonthBucket> {
        self.year(year).and_then(|y| y.month(month))
    }

    /// Snapshot of one month plus trainer metadata
    pub fn monthly(&self, year: i32, month: u32) -> Option<MonthlyWorkload> {
        self.month(year, month).map(|bucket| MonthlyWorkload {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            active: self.active,
            year,
            month,
            duration_minutes: bucket.duration_minutes,
        })
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// True when the aggregate has never been persisted
    pub fn is_new(&self) -> bool {
        self.version == 0
    }
}
