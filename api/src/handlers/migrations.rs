use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::models::{ExecutorDescriptor, JobSnapshot, JobSummary, MigrationConfig};

/// Request to start a migration
#[derive(Debug, Deserialize)]
pub struct SubmitMigrationRequest {
    #[serde(rename = "type")]
    pub executor_type: String,
    pub config: MigrationConfig,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub accepted: bool,
}

/// List registered migration types with their phases
#[tracing::instrument(skip(state))]
pub async fn list_types(State(state): State<AppState>) -> SuccessResponse<Vec<ExecutorDescriptor>> {
    SuccessResponse::new(state.dispatcher.list_types())
}

/// Validate and start a migration
///
/// Answers 202 once the run is spawned and 422 with the validation result
/// when the configuration is rejected.
#[tracing::instrument(skip(state, payload))]
pub async fn submit_migration(
    State(state): State<AppState>,
    payload: Result<Json<SubmitMigrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SuccessResponse<JobSnapshot>>), ErrorResponse> {
    let Json(req) = payload.map_err(|rejection| {
        ErrorResponse::new("bad_request", format!("Malformed request: {}", rejection.body_text()))
    })?;

    let handle = state
        .dispatcher
        .submit(&req.executor_type, req.config)
        .await?;

    if !handle.is_started() {
        let mut details = serde_json::to_value(handle.validation()).map_err(|e| {
            ErrorResponse::new(
                "serialization_error",
                format!("Failed to serialize validation result: {}", e),
            )
        })?;
        if let Some(object) = details.as_object_mut() {
            object.insert("job_id".to_string(), serde_json::json!(handle.id()));
        }
        return Err(
            ErrorResponse::new("validation_error", "Migration configuration is invalid")
                .with_details(details),
        );
    }

    let snapshot = handle
        .job()
        .snapshot(state.config.dispatcher.status_log_tail);
    tracing::info!(job_id = %handle.id(), executor_type = %req.executor_type, "Migration accepted");

    Ok((StatusCode::ACCEPTED, Json(SuccessResponse::new(snapshot))))
}

/// List tracked migrations, oldest first
#[tracing::instrument(skip(state))]
pub async fn list_migrations(State(state): State<AppState>) -> SuccessResponse<Vec<JobSummary>> {
    SuccessResponse::new(state.dispatcher.list_jobs())
}

/// Status snapshot of one migration
#[tracing::instrument(skip(state))]
pub async fn get_migration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<JobSnapshot>, ErrorResponse> {
    state
        .dispatcher
        .status(id)
        .map(SuccessResponse::new)
        .ok_or_else(|| ErrorResponse::not_found(id))
}

/// Request cancellation of a migration
#[tracing::instrument(skip(state))]
pub async fn cancel_migration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<CancelResponse>, ErrorResponse> {
    if state.dispatcher.job(id).is_none() {
        return Err(ErrorResponse::not_found(id));
    }
    let accepted = state.dispatcher.cancel(id);
    Ok(SuccessResponse::new(CancelResponse { accepted }))
}

/// Forget a finished migration
#[tracing::instrument(skip(state))]
pub async fn delete_migration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<JobSnapshot>, ErrorResponse> {
    let snapshot = state.dispatcher.remove(id)?;
    tracing::info!(job_id = %id, state = %snapshot.state, "Migration removed");
    Ok(SuccessResponse::new(snapshot))
}
