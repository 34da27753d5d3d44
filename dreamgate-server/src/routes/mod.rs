//! Route table.

mod chat;
mod images;
mod misc;
mod tasks;
mod usage;
mod videos;

use crate::server::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

/// Assembles the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Sync generation
        .route("/v1/images/generations", post(images::generate))
        .route("/v1/images/compositions", post(images::compose))
        .route("/v1/videos/generations", post(videos::generate))
        .route("/v1/chat/completions", post(chat::completions))
        // Async task API
        .route("/v1/async/images/generations", post(tasks::submit_image))
        .route(
            "/v1/async/images/compositions",
            post(tasks::submit_composition),
        )
        .route("/v1/async/videos/generations", post(tasks::submit_video))
        .route("/v1/async/tasks", get(tasks::list))
        .route("/v1/async/tasks/{id}/status", get(tasks::status))
        .route("/v1/async/tasks/{id}/result", get(tasks::result))
        .route("/v1/async/tasks/{id}/cancel", delete(tasks::cancel))
        .route("/v1/async/tasks/{id}", delete(tasks::remove))
        .route("/v1/async/stats", get(tasks::stats))
        .route("/v1/async/batch/submit", post(tasks::batch_submit))
        .route("/v1/async/batch/cancel", delete(tasks::batch_cancel))
        // Usage
        .route("/usage/today", get(usage::today))
        .route("/usage/stats", get(usage::stats))
        .route("/usage/history", get(usage::history))
        // Misc
        .route("/v1/models", get(misc::models))
        .route("/ping", get(misc::ping))
        .with_state(state)
}
