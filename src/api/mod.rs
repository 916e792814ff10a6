//! HTTP API surface
//!
//! Small operational sidecar next to the worker: health probes plus direct
//! access to the inference collaborators for search (text embedding) and
//! sample generation.

mod embed;
mod generate;
mod health;

use crate::embedding::EmbeddingBackend;
use crate::generator::GenerationBackend;
use crate::storage::BlobStore;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub generator: Arc<dyn GenerationBackend>,
    pub blob_store: Arc<dyn BlobStore>,
    pub startup_time: DateTime<Utc>,
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/api/embed/text", post(embed::embed_text))
        .route("/api/generate", post(generate::generate))
        .with_state(state)
}
