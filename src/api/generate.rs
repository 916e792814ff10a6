//! Audio generation endpoint
//!
//! Generates a sample from a text prompt, uploads it to blob storage, and
//! returns a bounded-lifetime download URL. The local temp file is removed
//! whether or not the upload succeeds.

use super::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Longest sample the generation sidecar will produce
const MAX_DURATION_SECONDS: u32 = 30;

fn default_duration() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    prompt: String,
    #[serde(default = "default_duration")]
    duration: u32,
}

/// POST /api/generate - text prompt to downloadable audio sample
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<Value>> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }
    if request.duration == 0 || request.duration > MAX_DURATION_SECONDS {
        return Err(ApiError::BadRequest(format!(
            "duration must be between 1 and {} seconds",
            MAX_DURATION_SECONDS
        )));
    }

    let path = state
        .generator
        .text_to_audio(prompt, request.duration)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let upload = state.blob_store.upload_sample(&path).await;

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), error = %e, "temp file cleanup failed");
    }

    let url = upload.map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(duration_seconds = request.duration, "sample generated and uploaded");
    Ok(Json(json!({
        "url": url,
        "duration": request.duration,
    })))
}
