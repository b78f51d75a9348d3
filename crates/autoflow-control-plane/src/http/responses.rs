//! HTTP request and response types.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use autoflow_core::{ActionSpec, Batch, CoreError, RunStatusView, Schedule, Task};

// ============================================================================
// Request types
// ============================================================================

/// Body of the toggle endpoint.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub disabled: bool,
}

/// Body of the task run endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RunTaskRequest {
    #[serde(default)]
    pub company_name: Option<String>,
}

/// Body of the schedule endpoint.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub interval_seconds: i64,
}

// ============================================================================
// Response types
// ============================================================================

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub success: bool,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub success: bool,
    pub task: Task,
}

/// Status of a task's current or last run.
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: RunStatusView,
}

/// A batch together with its schedule, if any.
#[derive(Debug, Serialize)]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: Batch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Serialize)]
pub struct BatchListResponse {
    pub success: bool,
    pub batches: Vec<BatchView>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub batch: BatchView,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub success: bool,
    pub schedule: Schedule,
}

#[derive(Debug, Serialize)]
pub struct ActionTypesResponse {
    pub success: bool,
    pub action_types: Vec<ActionSpec>,
}

/// Health check body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
}

// ============================================================================
// Error types
// ============================================================================

/// Error returned by API handlers.
///
/// Rendered as `{success: false, error, error_code}` with a status code
/// matching the error kind.
#[derive(Debug)]
pub enum ApiError {
    /// Request body is not valid JSON for the endpoint.
    InvalidJson(String),
    /// Domain error.
    Core(CoreError),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::InvalidJson(e.body_text())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::InvalidJson(message) => {
                (StatusCode::BAD_REQUEST, "invalid_json", message.clone())
            }
            Self::Core(e) => {
                let status = match e {
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::TaskNotFound(_)
                    | CoreError::RunNotFound(_)
                    | CoreError::BatchNotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Conflict(_) => StatusCode::CONFLICT,
                };
                let code = match e {
                    CoreError::Validation(_) => "validation",
                    CoreError::Conflict(c) => c.as_str(),
                    _ => "not_found",
                };
                (status, code, e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();
        debug!(status = %status, error_code, error = %message, "Request failed");

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}
