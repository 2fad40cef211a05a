//! Liveness endpoints. No market data here, just process health.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn api_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "ts": Utc::now().timestamp_millis(),
        "uptime": state.started_at.elapsed().as_secs(),
        "sessions": state.registry.len(),
    }))
}
