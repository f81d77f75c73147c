//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{MonthlyWorkload, TrainerAggregate, TrainerProfile};
use crate::domain::message::HEADER_CORRELATION_ID;
use crate::domain::{ChangeEvent, OperationContext};
use crate::engine::{
    AccumulateWorkloadCommand, ReplaceWorkloadCommand, SubtractWorkloadCommand, WorkloadChange,
    WorkloadEngine, WorkloadKey,
};
use crate::error::AppError;
use crate::messaging::{Message, MessageBroker};

/// Shared state of the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub engine: WorkloadEngine,
    pub broker: Arc<dyn MessageBroker>,
    pub ingestion_queue: String,
}

impl AppState {
    pub fn new(
        engine: WorkloadEngine,
        broker: Arc<dyn MessageBroker>,
        ingestion_queue: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            broker,
            ingestion_queue: ingestion_queue.into(),
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

/// Direction of a recorded training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Add,
    Delete,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingWorkloadRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub training_date: NaiveDate,
    pub duration_minutes: i64,
    pub action_type: ActionType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplaceWorkloadRequest {
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub duration_minutes: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonthSummary {
    pub month: u32,
    pub duration_minutes: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: i32,
    pub total_minutes: i64,
    pub months: Vec<MonthSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainerSummaryResponse {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub years: Vec<YearSummary>,
    pub version: i64,
}

impl From<TrainerAggregate> for TrainerSummaryResponse {
    fn from(aggregate: TrainerAggregate) -> Self {
        let years = aggregate
            .years()
            .iter()
            .map(|year| YearSummary {
                year: year.year(),
                total_minutes: year.total_minutes(),
                months: year
                    .months()
                    .iter()
                    .map(|month| MonthSummary {
                        month: month.month(),
                        duration_minutes: month.duration_minutes(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            username: aggregate.username().to_string(),
            first_name: aggregate.first_name().to_string(),
            last_name: aggregate.last_name().to_string(),
            active: aggregate.is_active(),
            years,
            version: aggregate.version(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageAcceptedResponse {
    pub correlation_id: String,
    pub queue: String,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/workloads", post(record_training))
        .route(
            "/workloads/:username/:year/:month",
            get(get_monthly_workload)
                .put(replace_workload)
                .delete(delete_workload),
        )
        .route("/workloads/:username", get(get_trainer_summary))
        .route("/messages", post(publish_message))
}

// =========================================================================
// POST /workloads
// =========================================================================

/// Add or subtract a training's duration for the month of its date
async fn record_training(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<TrainingWorkloadRequest>,
) -> Result<Json<WorkloadChange>, AppError> {
    if request.username.trim().is_empty() {
        return Err(AppError::InvalidRequest("username is required".to_string()));
    }

    let key = WorkloadKey::for_date(request.username, request.training_date);

    let change = match request.action_type {
        ActionType::Add => {
            let profile =
                TrainerProfile::new(request.first_name, request.last_name, request.active);
            let command = AccumulateWorkloadCommand::new(key, profile, request.duration_minutes);
            state.engine.upsert_and_add(command, &context).await?
        }
        ActionType::Delete => {
            let command = SubtractWorkloadCommand::new(key, request.duration_minutes);
            state.engine.subtract(command, &context).await?
        }
    };

    Ok(Json(change))
}

// =========================================================================
// /workloads/:username/:year/:month
// =========================================================================

/// Get one month's workload
async fn get_monthly_workload(
    State(state): State<AppState>,
    Path((username, year, month)): Path<(String, i32, u32)>,
) -> Result<Json<MonthlyWorkload>, AppError> {
    let monthly = state
        .engine
        .get_monthly(&WorkloadKey::new(username, year, month))
        .await?;

    Ok(Json(monthly))
}

/// Overwrite one month's workload for an existing trainer
async fn replace_workload(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path((username, year, month)): Path<(String, i32, u32)>,
    Json(request): Json<ReplaceWorkloadRequest>,
) -> Result<Json<WorkloadChange>, AppError> {
    let command = ReplaceWorkloadCommand::new(
        WorkloadKey::new(username, year, month),
        TrainerProfile::new(request.first_name, request.last_name, request.active),
        request.duration_minutes,
    );

    let change = state.engine.replace_duration(command, &context).await?;
    Ok(Json(change))
}

/// Remove one month's workload
async fn delete_workload(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path((username, year, month)): Path<(String, i32, u32)>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .delete(WorkloadKey::new(username, year, month), &context)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /workloads/:username
// =========================================================================

/// Full year/month tree for a trainer
async fn get_trainer_summary(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<TrainerSummaryResponse>, AppError> {
    let aggregate = state.engine.get_summary(&username).await?;
    Ok(Json(aggregate.into()))
}

// =========================================================================
// POST /messages
// =========================================================================

/// Queue a change-event for asynchronous ingestion
async fn publish_message(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(event): Json<ChangeEvent>,
) -> Result<(StatusCode, Json<MessageAcceptedResponse>), AppError> {
    let correlation_id = event
        .correlation_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| context.correlation_id.clone());

    let message = Message::json(&event)?.with_header(HEADER_CORRELATION_ID, correlation_id.clone());
    state.broker.publish(&state.ingestion_queue, message).await?;

    tracing::info!(
        correlation_id = %correlation_id,
        queue = %state.ingestion_queue,
        message_type = ?event.message_type,
        "Change event queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageAcceptedResponse {
            correlation_id,
            queue: state.ingestion_queue.clone(),
        }),
    ))
}
