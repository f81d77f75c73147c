//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Business rule violations and missing-bucket lookups on a trainer aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Trainer has never been written
    #[error("Trainer not found: {username}")]
    TrainerNotFound { username: String },

    /// Trainer exists but has no bucket for the year
    #[error("No workload for trainer {username} in year {year}")]
    YearNotFound { username: String, year: i32 },

    /// Year exists but has no bucket for the month
    #[error("No workload for trainer {username} in {year}-{month:02}")]
    MonthNotFound {
        username: String,
        year: i32,
        month: u32,
    },

    /// Subtraction would drive the duration negative
    #[error("Insufficient workload: requested {requested} minutes, available {available}")]
    InsufficientWorkload { requested: i64, available: i64 },

    /// Duration delta or replacement value out of range
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Year below 1 or month outside 1..=12
    #[error("Invalid period: year {year}, month {month}")]
    InvalidPeriod { year: i32, month: u32 },
}

impl DomainError {
    pub fn trainer_not_found(username: impl Into<String>) -> Self {
        Self::TrainerNotFound {
            username: username.into(),
        }
    }

    /// True for any of the trainer/year/month lookup failures
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TrainerNotFound { .. } | Self::YearNotFound { .. } | Self::MonthNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants() {
        assert!(DomainError::trainer_not_found("alice").is_not_found());
        assert!(DomainError::YearNotFound {
            username: "alice".to_string(),
            year: 2025
        }
        .is_not_found());
        assert!(DomainError::MonthNotFound {
            username: "alice".to_string(),
            year: 2025,
            month: 5
        }
        .is_not_found());
    }

    #[test]
    fn test_insufficient_workload_error() {
        let err = DomainError::InsufficientWorkload {
            requested: 90,
            available: 60,
        };

        assert!(!err.is_not_found());
        assert!(err.to_string().contains("90"));
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_month_not_found_message_pads_month() {
        let err = DomainError::MonthNotFound {
            username: "bob".to_string(),
            year: 2024,
            month: 3,
        };
        assert_eq!(err.to_string(), "No workload for trainer bob in 2024-03");
    }
}
