//! Sync video endpoint.

use super::images::ImagesResponse;
use crate::auth;
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use dreamgate::generation::{RawVideoRequest, RunControl};
use std::sync::Arc;

/// POST /v1/videos/generations
pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RawVideoRequest>,
) -> Result<Json<ImagesResponse>, ApiError> {
    let credential = auth::credential(&headers)?;
    let request = body.validate()?;

    let urls = state
        .engine
        .controller()
        .generate_video(&request, &credential, RunControl::detached())
        .await?;
    Ok(Json(ImagesResponse::from_urls(urls)))
}
