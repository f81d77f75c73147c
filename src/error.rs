//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::engine::WorkloadError;
use crate::messaging::BrokerError;
use crate::store::StoreError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Engine errors
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    // Server errors (5xx)
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::Workload(WorkloadError::Domain(err))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn domain_status(err: &DomainError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        DomainError::TrainerNotFound { username } => {
            (StatusCode::NOT_FOUND, "trainer_not_found", Some(username.clone()))
        }
        DomainError::YearNotFound { .. } => (StatusCode::NOT_FOUND, "year_not_found", None),
        DomainError::MonthNotFound { .. } => (StatusCode::NOT_FOUND, "month_not_found", None),
        DomainError::InsufficientWorkload {
            requested,
            available,
        } => (
            StatusCode::BAD_REQUEST,
            "insufficient_workload",
            Some(format!("requested {}, available {}", requested, available)),
        ),
        DomainError::InvalidDuration(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_duration", Some(msg.clone()))
        }
        DomainError::InvalidPeriod { .. } => (StatusCode::BAD_REQUEST, "invalid_period", None),
    }
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        StoreError::ConcurrencyConflict { expected, actual, .. } => (
            StatusCode::CONFLICT,
            "version_conflict",
            Some(format!("expected {}, found {}", expected, actual)),
        ),
        StoreError::Unavailable(msg) => {
            tracing::error!("Store unavailable: {}", msg);
            (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
        }
        StoreError::Database(e) => {
            tracing::error!("Database error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
        }
        StoreError::InvalidData(msg) => {
            tracing::error!("Invalid stored data: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid_stored_data", None)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // Engine errors - map to appropriate HTTP status
            AppError::Workload(WorkloadError::Domain(err)) => domain_status(err),
            AppError::Workload(WorkloadError::Store(err)) => store_status(err),

            // 500 Internal Server Error
            AppError::Broker(e) => {
                tracing::error!("Broker error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "broker_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(DomainError::trainer_not_found("alice").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                DomainError::InsufficientWorkload {
                    requested: 10,
                    available: 5
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Workload(WorkloadError::Store(
                StoreError::ConcurrencyConflict {
                    username: "alice".to_string(),
                    expected: 1,
                    actual: 2
                }
            ))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AppError::InvalidRequest("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Broker(BrokerError::Poisoned)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
