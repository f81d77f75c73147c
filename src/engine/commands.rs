//! Command definitions
//!
//! Commands represent intentions to change a trainer's workload.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::aggregate::TrainerProfile;

/// Identifies one month of one trainer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadKey {
    pub username: String,
    pub year: i32,
    pub month: u32,
}

impl WorkloadKey {
    pub fn new(username: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            username: username.into(),
            year,
            month,
        }
    }

    /// Key for the month containing `date`
    pub fn for_date(username: impl Into<String>, date: NaiveDate) -> Self {
        Self::new(username, date.year(), date.month())
    }
}

// =========================================================================
// AccumulateWorkloadCommand
// =========================================================================

/// Add minutes to a month, creating the trainer and buckets if needed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulateWorkloadCommand {
    pub key: WorkloadKey,
    pub profile: TrainerProfile,
    pub delta_minutes: i64,
}

impl AccumulateWorkloadCommand {
    pub fn new(key: WorkloadKey, profile: TrainerProfile, delta_minutes: i64) -> Self {
        Self {
            key,
            profile,
            delta_minutes,
        }
    }
}

// =========================================================================
// ReplaceWorkloadCommand
// =========================================================================

/// Overwrite a month's minutes for an existing trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceWorkloadCommand {
    pub key: WorkloadKey,
    pub profile: TrainerProfile,
    pub duration_minutes: i64,
}

impl ReplaceWorkloadCommand {
    pub fn new(key: WorkloadKey, profile: TrainerProfile, duration_minutes: i64) -> Self {
        Self {
            key,
            profile,
            duration_minutes,
        }
    }
}

// =========================================================================
// SubtractWorkloadCommand
// =========================================================================

/// Remove minutes from an existing month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtractWorkloadCommand {
    pub key: WorkloadKey,
    pub delta_minutes: i64,
}

impl SubtractWorkloadCommand {
    pub fn new(key: WorkloadKey, delta_minutes: i64) -> Self {
        Self { key, delta_minutes }
    }
}

/// Result of a successful mutation.
///
/// `duration_minutes == 0` means the month bucket no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadChange {
    pub username: String,
    pub year: i32,
    pub month: u32,
    pub duration_minutes: i64,
    pub version: i64,
}

impl WorkloadChange {
    pub(crate) fn new(key: &WorkloadKey, duration_minutes: i64, version: i64) -> Self {
        Self {
            username: key.username.clone(),
            year: key.year,
            month: key.month,
            duration_minutes,
            version,
        }
    }

    /// True when the change removed the month bucket
    pub fn is_removed(&self) -> bool {
        self.duration_minutes == 0
    }
}
