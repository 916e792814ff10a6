//! Text embedding endpoint
//!
//! Lets the search service embed free-text queries into the same vector
//! space the audio embeddings live in.

use super::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct EmbedTextRequest {
    text: String,
}

/// POST /api/embed/text - embed a natural-language description
pub async fn embed_text(
    State(state): State<AppState>,
    Json(request): Json<EmbedTextRequest>,
) -> ApiResult<Json<Value>> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let vector = state
        .embedder
        .text_embedding(text)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    debug!(dim = vector.len(), "text embedded via API");
    Ok(Json(json!({ "vector": vector })))
}
