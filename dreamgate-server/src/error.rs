//! API error type and HTTP status mapping.
//!
//! Every route handler returns `Result<_, ApiError>`; the `IntoResponse`
//! impl maps the library error taxonomy onto status codes and a JSON
//! error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dreamgate::generation::GenerateError;
use dreamgate::quota::QuotaError;
use dreamgate::task::TaskError;
use dreamgate::upload::UploadError;
use dreamgate::upstream::{TransportError, UpstreamError};
use serde_json::json;
use tracing::{error, warn};

/// Error returned by all route handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, kind = self.kind, message = %self.message, "Request failed");
        } else {
            warn!(status = %self.status, kind = self.kind, message = %self.message, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "type": self.kind,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        match &e {
            GenerateError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_request", e.to_string())
            }
            GenerateError::UnsupportedModel(_) => {
                Self::new(StatusCode::BAD_REQUEST, "unsupported_model", e.to_string())
            }
            GenerateError::Quota(quota) => quota_error(quota, e.to_string()),
            GenerateError::Upload(upload) => upload_error(upload, e.to_string()),
            GenerateError::Upstream(upstream) => upstream_error(upstream, e.to_string()),
            GenerateError::PollTimeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "poll_timeout", e.to_string())
            }
            GenerateError::ResultExtraction(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "result_extraction_failed",
                e.to_string(),
            ),
            GenerateError::Cancelled => {
                Self::new(StatusCode::CONFLICT, "cancelled", e.to_string())
            }
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        let status = match &e {
            TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::NotCompleted { .. }
            | TaskError::InvalidTransition { .. }
            | TaskError::DeleteFailed { .. } => StatusCode::CONFLICT,
        };
        let kind = match &e {
            TaskError::NotFound(_) => "task_not_found",
            TaskError::NotCompleted { .. } => "task_not_completed",
            TaskError::InvalidTransition { .. } => "task_transition_rejected",
            TaskError::DeleteFailed { .. } => "task_delete_rejected",
        };
        Self::new(status, kind, e.to_string())
    }
}

impl From<QuotaError> for ApiError {
    fn from(e: QuotaError) -> Self {
        let message = e.to_string();
        quota_error(&e, message)
    }
}

fn quota_error(e: &QuotaError, message: String) -> ApiError {
    match e {
        QuotaError::Exceeded { .. } => {
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "quota_exceeded", message)
        }
        QuotaError::Io(_) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "quota_storage", message)
        }
    }
}

fn upload_error(e: &UploadError, message: String) -> ApiError {
    match e {
        UploadError::Source(_) => ApiError::new(StatusCode::BAD_REQUEST, "invalid_image", message),
        UploadError::Auth(_) => ApiError::new(StatusCode::BAD_GATEWAY, "upload_auth", message),
        UploadError::CommitFailed { .. } => {
            ApiError::new(StatusCode::BAD_GATEWAY, "upload_commit_failed", message)
        }
        UploadError::Network(_) | UploadError::Timeout(_) => {
            ApiError::new(StatusCode::BAD_GATEWAY, "upload_failed", message)
        }
    }
}

fn upstream_error(e: &UpstreamError, message: String) -> ApiError {
    match e {
        UpstreamError::Transport(TransportError::Timeout(_)) => {
            ApiError::new(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", message)
        }
        UpstreamError::Transport(_) | UpstreamError::Protocol(_) => {
            ApiError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
        }
        UpstreamError::GenerationFailed { .. } => {
            ApiError::new(StatusCode::BAD_GATEWAY, "generation_failed", message)
        }
    }
}
