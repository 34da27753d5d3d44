//! Sync image endpoints.

use crate::auth;
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use dreamgate::generation::{RawCompositionRequest, RawImageRequest, RunControl};
use serde::Serialize;
use std::sync::Arc;

/// OpenAI-style image response.
#[derive(Serialize)]
pub struct ImagesResponse {
    pub created: i64,
    pub data: Vec<ImageEntry>,
}

#[derive(Serialize)]
pub struct ImageEntry {
    pub url: String,
}

impl ImagesResponse {
    pub fn from_urls(urls: Vec<String>) -> Self {
        Self {
            created: Utc::now().timestamp(),
            data: urls.into_iter().map(|url| ImageEntry { url }).collect(),
        }
    }
}

/// POST /v1/images/generations
pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RawImageRequest>,
) -> Result<Json<ImagesResponse>, ApiError> {
    let credential = auth::credential(&headers)?;
    let request = body.validate()?;

    let urls = state
        .engine
        .controller()
        .generate_image(&request, &credential, RunControl::detached())
        .await?;
    Ok(Json(ImagesResponse::from_urls(urls)))
}

/// POST /v1/images/compositions
pub async fn compose(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RawCompositionRequest>,
) -> Result<Json<ImagesResponse>, ApiError> {
    let credential = auth::credential(&headers)?;
    let request = body.validate()?;

    let urls = state
        .engine
        .controller()
        .generate_image_composition(&request, &credential, RunControl::detached())
        .await?;
    Ok(Json(ImagesResponse::from_urls(urls)))
}
