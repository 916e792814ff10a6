//! Health and root endpoints

use super::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

/// GET / - service identification
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "vibe-analysis",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health - liveness probe with uptime
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds();
    Json(json!({
        "status": "healthy",
        "uptime_seconds": uptime,
    }))
}
