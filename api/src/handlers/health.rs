use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running_migrations: usize,
    pub executor_types: Vec<String>,
}

/// Liveness probe with a small dispatcher summary
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            running_migrations: state.dispatcher.running_count(),
            executor_types: state.dispatcher.registry().types(),
        }),
    )
}
