//! Engine Errors

use crate::domain::DomainError;
use crate::store::StoreError;

/// Errors returned by [`super::WorkloadEngine`] operations
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// Business rule or lookup failure
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkloadError {
    /// Trainer, year or month absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkloadError::Domain(e) if e.is_not_found())
    }

    /// Transport-level failure worth redelivering
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkloadError::Store(e) if e.is_retryable())
    }

    /// Optimistic-lock retries were exhausted
    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkloadError::Store(e) if e.is_concurrency_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let not_found = WorkloadError::from(DomainError::trainer_not_found("bob"));
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transient());

        let insufficient = WorkloadError::from(DomainError::InsufficientWorkload {
            requested: 10,
            available: 5,
        });
        assert!(!insufficient.is_not_found());
        assert!(!insufficient.is_transient());

        let unavailable = WorkloadError::from(StoreError::Unavailable("down".to_string()));
        assert!(unavailable.is_transient());
        assert!(!unavailable.is_conflict());

        let invalid = WorkloadError::from(StoreError::InvalidData("month 13".to_string()));
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_display_is_transparent() {
        let err = WorkloadError::from(DomainError::InsufficientWorkload {
            requested: 10,
            available: 5,
        });
        assert_eq!(
            err.to_string(),
            DomainError::InsufficientWorkload {
                requested: 10,
                available: 5
            }
            .to_string()
        );
    }
}
