//! Embedding vector backfill
//!
//! One-shot operator sweep for audio assets that have no stored embedding,
//! either analyzed before the embedding stage existed or processed while
//! the inference sidecar was down. Each asset is downloaded, embedded, and
//! its vector written back; analysis fields and status are left untouched.
//! Per-asset faults are logged and skipped so one bad object never stops
//! the sweep.

use crate::db::{BackfillStore, VectorlessAsset};
use crate::embedding::EmbeddingBackend;
use crate::storage::BlobStore;
use tracing::{error, info, warn};

/// Outcome counts of one backfill sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Sweep every vectorless audio asset and fill in its embedding
pub async fn run_backfill(
    store: &dyn BackfillStore,
    blob_store: &dyn BlobStore,
    embedder: &dyn EmbeddingBackend,
) -> anyhow::Result<BackfillReport> {
    let assets = store.vectorless_assets().await?;
    info!(count = assets.len(), "audio assets missing embedding vectors");

    let mut report = BackfillReport {
        scanned: assets.len(),
        ..Default::default()
    };

    for asset in &assets {
        match backfill_one(store, blob_store, embedder, asset).await {
            Ok(dim) => {
                info!(asset_id = asset.id, dim = dim, "vector written");
                report.updated += 1;
            }
            Err(e) => {
                error!(asset_id = asset.id, error = %e, "backfill failed, skipping asset");
                report.failed += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        updated = report.updated,
        failed = report.failed,
        "backfill sweep finished"
    );
    Ok(report)
}

async fn backfill_one(
    store: &dyn BackfillStore,
    blob_store: &dyn BlobStore,
    embedder: &dyn EmbeddingBackend,
    asset: &VectorlessAsset,
) -> anyhow::Result<usize> {
    let path = blob_store.download_to_temp(&asset.storage_name).await?;

    let embedded = embedder.audio_embedding(&path).await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), error = %e, "temp file cleanup failed");
    }

    let vector = embedded?;
    store.store_vector(asset.id, &vector).await?;
    Ok(vector.len())
}
