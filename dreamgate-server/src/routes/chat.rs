//! Chat-completions passthrough.
//!
//! OpenAI chat clients get image generation for free: the last user
//! message becomes the prompt, and the generated URLs come back as
//! markdown image links in the assistant message.

use crate::auth;
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use dreamgate::generation::{RawImageRequest, RunControl};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl ChatMessage {
    /// Flattens string or multi-part content to text.
    fn text(&self) -> String {
        match &self.content {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(parts) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

/// POST /v1/chat/completions
pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let credential = auth::credential(&headers)?;

    let prompt = body
        .messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.text())
        .unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(ApiError::bad_request("no user message with a prompt"));
    }

    let model = body.model.clone().unwrap_or_default();
    let request = RawImageRequest {
        model: Some(model.clone()),
        prompt: Some(prompt),
        ..Default::default()
    }
    .validate()?;

    let urls = state
        .engine
        .controller()
        .generate_image(&request, &credential, RunControl::detached())
        .await?;

    let content = urls
        .iter()
        .enumerate()
        .map(|(index, url)| format!("![image_{}]({})", index, url))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Json(json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content,
            },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": 0,
            "completion_tokens": 0,
            "total_tokens": 0,
        },
    })))
}

/// Chat completion ids follow the `chatcmpl-` convention.
fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}
