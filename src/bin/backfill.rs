//! Backfill entry point: embed every audio asset missing a vector
//!
//! Run once against a deployed stack, e.g. inside the service container:
//! `backfill` with the same environment as the worker.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vibe_analysis::backfill::run_backfill;
use vibe_analysis::config::Config;
use vibe_analysis::db::{connect_pool, MySqlAssetStore};
use vibe_analysis::embedding::HttpEmbeddingClient;
use vibe_analysis::storage::S3BlobStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vibe_analysis=info,backfill=info,warn")),
        )
        .init();

    let config = Config::from_env();
    info!("embedding vector backfill starting");

    let pool = connect_pool(&config.database.url()).await?;
    let store = MySqlAssetStore::new(pool);
    let blob_store = S3BlobStore::new(&config.minio);
    let embedder = HttpEmbeddingClient::new(config.service.model_server_url.clone());

    let report = run_backfill(&store, &blob_store, &embedder).await?;

    if report.failed > 0 {
        anyhow::bail!(
            "{} of {} assets failed to backfill",
            report.failed,
            report.scanned
        );
    }
    Ok(())
}
