//! Error types for vibe-analysis
//!
//! Each pipeline stage owns a dedicated error enum so the worker can
//! pattern-match on hard vs. soft failures instead of catching blanket
//! exceptions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Analysis Stage errors (hard dependency: aborts the task)
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Audio file could not be decoded
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// Decoding succeeded but feature extraction failed
    #[error("feature extraction failed: {0}")]
    Extraction(String),
}

/// Embedding Stage errors (soft dependency: logged, task continues)
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Inference sidecar request failed
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Sidecar violated the fixed-length vector contract
    #[error("embedding backend returned {got} components, expected {expected}")]
    BadDimension { expected: usize, got: usize },

    /// Audio file could not be read for upload
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object download failed (missing object or transport fault)
    #[error("object download failed: {0}")]
    Download(String),

    /// Object upload failed
    #[error("object upload failed: {0}")]
    Upload(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Generation sidecar request failed
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Generated audio could not be written locally
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal per-task faults (download, decode/analysis, persistence)
///
/// Any of these aborts the remaining stages and triggers the best-effort
/// failure-status write. The task is still acknowledged.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("download failed: {0}")]
    Storage(#[from] StorageError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("persistence failed: {0}")]
    Persist(#[source] anyhow::Error),
}

/// API error type for the HTTP surface
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
