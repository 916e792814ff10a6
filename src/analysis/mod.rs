//! Analysis Stage: decode, then extract duration / tempo / key
//!
//! A hard dependency of the pipeline: any failure here aborts the task.
//! Decoding and feature extraction are CPU-bound, so the stage runs on the
//! blocking pool and drops the sample buffers before returning to bound
//! peak memory under sequential task processing.

pub mod key;

use crate::dsp;
use crate::error::AnalysisError;
use crate::models::AnalysisResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Analysis Stage contract, seam for worker tests
#[async_trait]
pub trait AudioAnalyzer: Send + Sync {
    async fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError>;
}

/// Production analyzer backed by the dsp primitives
pub struct Analyzer;

#[async_trait]
impl AudioAnalyzer for Analyzer {
    async fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || analyze_file(&path))
            .await
            .map_err(|e| AnalysisError::Extraction(format!("analysis task panicked: {}", e)))?
    }
}

/// Decode an audio file and extract BPM, key, and duration
fn analyze_file(path: &Path) -> Result<AnalysisResult, AnalysisError> {
    info!(path = %path.display(), "analyzing audio");

    let result = {
        let audio = dsp::decode_audio_file(path)?;

        let duration = audio.duration_seconds();
        debug!(duration_seconds = duration, "duration extracted");

        let tempo = dsp::tempo::track_tempo(&audio.samples, audio.sample_rate);
        let bpm = dsp::tempo::to_bpm(tempo);
        debug!(bpm = bpm, "tempo extracted");

        let frames = dsp::chroma::chroma_features(&audio.samples, audio.sample_rate);
        let key = key::estimate_key(&dsp::chroma::mean_chroma(&frames));
        debug!(key = %key, "key extracted");

        AnalysisResult {
            bpm,
            key,
            duration,
        }
        // audio and frames dropped here, before the result leaves the stage
    };

    info!(
        bpm = result.bpm,
        key = %result.key,
        duration_seconds = result.duration,
        "audio analysis complete"
    );
    Ok(result)
}
