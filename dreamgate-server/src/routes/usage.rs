//! Usage and quota endpoints.

use crate::auth;
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDate, Utc};
use dreamgate::quota::ServiceKind;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// GET /usage/today: the caller's remaining allowance per service.
pub async fn today(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let credential = auth::credential(&headers)?;
    let session = credential.session_id();
    let ledger = state.engine.ledger();

    let mut services = serde_json::Map::new();
    for service in [ServiceKind::Image, ServiceKind::Video, ServiceKind::Avatar] {
        let decision = ledger.check(&session, service).await;
        services.insert(
            service.as_str().to_string(),
            json!({
                "used": decision.current,
                "limit": decision.limit,
                "remaining": decision.remaining,
            }),
        );
    }

    Ok(Json(json!({
        "session": session,
        "date": Utc::now().date_naive(),
        "services": services,
    })))
}

/// Query parameters of /usage/stats.
#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

/// GET /usage/stats: daily aggregate, or a range when `from`/`to` are
/// given.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ledger = state.engine.ledger();

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::bad_request("'from' must not be after 'to'"));
        }
        let range = ledger.range_stats(from, to);
        return Ok(Json(serde_json::to_value(range).unwrap_or_default()));
    }

    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let daily = ledger.daily_stats(date);
    Ok(Json(serde_json::to_value(daily).unwrap_or_default()))
}

/// Query parameters of /usage/history.
#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    7
}

/// GET /usage/history: the caller's recent usage rows.
pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let credential = auth::credential(&headers)?;
    let session = credential.session_id();
    let rows = state
        .engine
        .ledger()
        .session_history(&session, query.days.min(90));
    Ok(Json(json!({
        "session": session,
        "days": query.days.min(90),
        "history": rows,
    })))
}
