pub mod health;
pub mod migrations;
pub mod sse;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use common::errors::{DispatchError, RegistryError};

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(id: uuid::Uuid) -> Self {
        Self::new("not_found", format!("Migration job not found: {}", id))
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error.as_str() {
            "bad_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "validation_error" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<DispatchError> for ErrorResponse {
    fn from(err: DispatchError) -> Self {
        let kind = match &err {
            DispatchError::Registry(RegistryError::UnknownType(_)) => "not_found",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::StillRunning(_) => "conflict",
            DispatchError::Registry(_) | DispatchError::ValidationFault(_) => "internal_error",
        };
        if kind == "internal_error" {
            tracing::error!(error = %err, "Dispatcher error");
        }
        Self::new(kind, err.to_string())
    }
}

/// Standard API success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
