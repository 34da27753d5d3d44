//! Async task endpoints.
//!
//! Submission validates the request eagerly (a task that can never run is
//! rejected with 400 instead of failing later), stores the original body
//! as the task params, and returns the task id. Status and result are
//! plain store reads; batch endpoints apply the single-task operation per
//! entry and report per-entry outcomes.

use crate::auth;
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use dreamgate::generation::{RawCompositionRequest, RawImageRequest, RawVideoRequest};
use dreamgate::task::{Task, TaskError, TaskParams, TaskStats, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Response for a newly created task.
#[derive(Serialize)]
pub struct TaskCreatedResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// Status view of a task.
#[derive(Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub progress: u8,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type,
            status: task.status,
            progress: task.progress,
            priority: task.priority,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            error: task.error,
        }
    }
}

/// POST /v1/async/images/generations
pub async fn submit_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), ApiError> {
    submit(state, &headers, TaskType::ImageGeneration, body)
}

/// POST /v1/async/images/compositions
pub async fn submit_composition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), ApiError> {
    submit(state, &headers, TaskType::ImageComposition, body)
}

/// POST /v1/async/videos/generations
pub async fn submit_video(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), ApiError> {
    submit(state, &headers, TaskType::VideoGeneration, body)
}

/// Shared submission path.
fn submit(
    state: Arc<AppState>,
    headers: &HeaderMap,
    task_type: TaskType,
    body: serde_json::Value,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), ApiError> {
    let token = auth::bearer_token(headers)?;
    let credential = dreamgate::credential::Credential::parse(&token);
    if credential.is_empty() {
        return Err(ApiError::unauthorized("empty refresh token"));
    }

    validate_for(task_type, &body)?;
    let priority = body.get("priority").and_then(|p| p.as_i64()).unwrap_or(0) as i32;

    let task = state.engine.store().create(
        task_type,
        TaskParams {
            credential: token,
            request: body,
        },
        priority,
        Some(credential.session_id()),
    );

    Ok((
        StatusCode::CREATED,
        Json(TaskCreatedResponse {
            task_id: task.id,
            status: task.status,
            created_at: task.created_at,
        }),
    ))
}

/// Eager validation: reject tasks that could never run.
fn validate_for(task_type: TaskType, body: &serde_json::Value) -> Result<(), ApiError> {
    match task_type {
        TaskType::ImageGeneration => {
            let raw: RawImageRequest = parse_body(body)?;
            raw.validate()?;
        }
        TaskType::ImageComposition => {
            let raw: RawCompositionRequest = parse_body(body)?;
            raw.validate()?;
        }
        TaskType::VideoGeneration => {
            let raw: RawVideoRequest = parse_body(body)?;
            raw.validate()?;
        }
    }
    Ok(())
}

fn parse_body<R: serde::de::DeserializeOwned>(body: &serde_json::Value) -> Result<R, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|e| ApiError::bad_request(format!("malformed request body: {}", e)))
}

/// GET /v1/async/tasks/{id}/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task = state
        .engine
        .store()
        .get(&id)
        .ok_or(TaskError::NotFound(id))?;
    Ok(Json(task.into()))
}

/// GET /v1/async/tasks/{id}/result
pub async fn result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state
        .engine
        .store()
        .get(&id)
        .ok_or_else(|| TaskError::NotFound(id.clone()))?;

    if task.status != TaskStatus::Completed {
        return Err(TaskError::NotCompleted {
            id,
            status: task.status,
        }
        .into());
    }

    Ok(Json(json!({
        "task_id": task.id,
        "status": task.status,
        "result": task.result.unwrap_or_default(),
        "completed_at": task.completed_at,
    })))
}

/// DELETE /v1/async/tasks/{id}/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let changed = state.engine.store().cancel(&id)?;
    let task = state
        .engine
        .store()
        .get(&id)
        .ok_or_else(|| TaskError::NotFound(id.clone()))?;
    Ok(Json(json!({
        "task_id": id,
        "cancelled": changed,
        "status": task.status,
    })))
}

/// DELETE /v1/async/tasks/{id}
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.store().delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query parameters of the task listing.
#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /v1/async/tasks: the caller's own tasks.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TaskStatusResponse>>, ApiError> {
    let credential = auth::credential(&headers)?;
    let session = credential.session_id();
    let tasks = state
        .engine
        .store()
        .list(Some(&session), query.status, query.limit.min(500));
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

/// GET /v1/async/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<TaskStats> {
    Json(state.engine.store().stats())
}

/// One entry of a batch submission.
#[derive(Deserialize)]
pub struct BatchEntry {
    pub task_type: TaskType,
    pub request: serde_json::Value,
}

#[derive(Deserialize)]
pub struct BatchSubmitRequest {
    pub tasks: Vec<BatchEntry>,
}

/// POST /v1/async/batch/submit: tasks are created one by one; each
/// entry succeeds or fails independently.
pub async fn batch_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BatchSubmitRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Authentication failures reject the whole batch.
    auth::credential(&headers)?;

    let mut results = Vec::with_capacity(body.tasks.len());
    for entry in body.tasks {
        match submit(Arc::clone(&state), &headers, entry.task_type, entry.request) {
            Ok((_, Json(created))) => results.push(json!({
                "task_id": created.task_id,
                "status": created.status,
            })),
            Err(e) => results.push(json!({
                "error": e.message(),
            })),
        }
    }
    Ok(Json(json!({ "results": results })))
}

#[derive(Deserialize)]
pub struct BatchCancelRequest {
    pub task_ids: Vec<String>,
}

/// DELETE /v1/async/batch/cancel
pub async fn batch_cancel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchCancelRequest>,
) -> Json<serde_json::Value> {
    let mut results = Vec::with_capacity(body.task_ids.len());
    for id in body.task_ids {
        match state.engine.store().cancel(&id) {
            Ok(changed) => results.push(json!({"task_id": id, "cancelled": changed})),
            Err(e) => results.push(json!({"task_id": id, "error": e.to_string()})),
        }
    }
    Json(json!({ "results": results }))
}
