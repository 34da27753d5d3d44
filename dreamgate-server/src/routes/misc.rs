//! Model listing and health check.

use crate::auth;
use crate::server::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use dreamgate::credential::Region;
use dreamgate::payload::list_models;
use serde_json::json;
use std::sync::Arc;

/// GET /v1/models: models served in the caller's region (CN when no
/// credential is presented).
pub async fn models(headers: HeaderMap) -> Json<serde_json::Value> {
    let region = auth::credential(&headers)
        .map(|credential| credential.region())
        .unwrap_or(Region::Cn);

    let data: Vec<_> = list_models(region)
        .into_iter()
        .map(|spec| {
            json!({
                "id": spec.name,
                "object": "model",
                "owned_by": "dreamgate",
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}

/// GET /ping
pub async fn ping(State(_state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": dreamgate::VERSION,
    }))
}
