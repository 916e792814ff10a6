//! Embedding Stage: audio/text → 512-dim semantic vector
//!
//! Model inference is opaque to this service. The sidecar contract is
//! strict: a response is exactly `EMBEDDING_DIM` numeric components, and any
//! heterogeneity in model output lives behind the sidecar's own adapter.
//! The worker treats this stage as a soft dependency.

use crate::error::EmbeddingError;
use crate::models::EMBEDDING_DIM;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Embedding collaborator contract
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed an audio file from a local path
    async fn audio_embedding(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a natural-language description
    async fn text_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct TextEmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

/// HTTP client for the inference sidecar
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Enforce the fixed-length vector contract at the boundary
    fn validate(vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if vector.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::BadDimension {
                expected: EMBEDDING_DIM,
                got: vector.len(),
            });
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn audio_embedding(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        let bytes = tokio::fs::read(path).await?;

        let response: EmbedResponse = self
            .http
            .post(format!("{}/embed/audio", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(dim = response.vector.len(), path = %path.display(), "audio embedding received");
        Self::validate(response.vector)
    }

    async fn text_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response: EmbedResponse = self
            .http
            .post(format!("{}/embed/text", self.base_url))
            .json(&TextEmbedRequest { text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(dim = response.vector.len(), "text embedding received");
        Self::validate(response.vector)
    }
}
