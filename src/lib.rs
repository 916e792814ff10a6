//! vibe-analysis: audio intelligence pipeline worker
//!
//! Consumes "asset uploaded" events from the message bus, extracts musical
//! features (tempo, key, duration), computes a semantic embedding, matches
//! zero-shot tags, persists the outcome to the shared `assets` table, and
//! publishes a completion event for the downstream search index.
//!
//! A small HTTP API rides alongside the worker for health probes, text
//! embedding, and prompt-driven sample generation.

pub mod analysis;
pub mod api;
pub mod backfill;
pub mod config;
pub mod db;
pub mod dsp;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod models;
pub mod storage;
pub mod tagger;
pub mod worker;

pub use api::{build_router, AppState};
pub use config::Config;
pub use models::{AnalysisResult, AnalysisTask, CompletionEvent};
pub use worker::{PipelineContext, Worker};
