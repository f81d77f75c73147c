//! Store Errors
//!
//! Error types for aggregate store operations.

/// Errors that can occur in an aggregate store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for trainer {username}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        username: String,
        expected: i64,
        actual: i64,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Persisted row violates an aggregate invariant
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error is retryable (transport-level)
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::ConcurrencyConflict { .. } | StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StoreError::InvalidData(_) => false,
        }
    }
}
