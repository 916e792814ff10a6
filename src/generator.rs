//! Audio generation collaborator: prompt → local .wav file
//!
//! Backs the `/api/generate` endpoint. Like embedding, the model itself is
//! opaque; the sidecar returns raw WAV bytes and this client writes them to
//! a temp file the caller owns (and cleans up).

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Generation collaborator contract
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate `duration_seconds` of audio from a text prompt; returns the
    /// path of a temporary .wav file the caller must delete.
    async fn text_to_audio(
        &self,
        prompt: &str,
        duration_seconds: u32,
    ) -> Result<PathBuf, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    duration: u32,
}

/// HTTP client for the generation sidecar
pub struct HttpGenerationClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGenerationClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn text_to_audio(
        &self,
        prompt: &str,
        duration_seconds: u32,
    ) -> Result<PathBuf, GenerationError> {
        let bytes = self
            .http
            .post(format!("{}/generate", self.base_url))
            .json(&GenerateRequest {
                prompt,
                duration: duration_seconds,
            })
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let file = tempfile::Builder::new()
            .prefix("musicgen_")
            .suffix(".wav")
            .tempfile()?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        tokio::fs::write(&path, &bytes).await?;

        info!(
            prompt = %prompt.chars().take(60).collect::<String>(),
            duration_seconds = duration_seconds,
            path = %path.display(),
            "audio generated"
        );
        Ok(path)
    }
}
