//! vibe-analysis service entry point
//!
//! Startup order matters: database and blob storage clients first, then the
//! tag vocabulary precompute (non-fatal), then the worker and the HTTP API
//! run side by side until Ctrl-C.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vibe_analysis::api::{build_router, AppState};
use vibe_analysis::analysis::Analyzer;
use vibe_analysis::config::Config;
use vibe_analysis::db::{connect_pool, MySqlAssetStore};
use vibe_analysis::embedding::HttpEmbeddingClient;
use vibe_analysis::generator::HttpGenerationClient;
use vibe_analysis::storage::S3BlobStore;
use vibe_analysis::tagger::{TagVocabulary, ZeroShotTagger};
use vibe_analysis::worker::{AmqpBus, PipelineContext, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vibe_analysis=info,warn")),
        )
        .init();

    let config = Config::from_env();
    info!(version = env!("CARGO_PKG_VERSION"), "vibe-analysis starting");

    let pool = connect_pool(&config.database.url()).await?;
    let asset_store = Arc::new(MySqlAssetStore::new(pool));

    let blob_store = Arc::new(S3BlobStore::new(&config.minio));
    let embedder = Arc::new(HttpEmbeddingClient::new(
        config.service.model_server_url.clone(),
    ));
    let generator = Arc::new(HttpGenerationClient::new(
        config.service.model_server_url.clone(),
    ));

    // Vocabulary precompute is non-fatal: without it the pipeline still
    // analyzes and embeds, it just stops auto-tagging
    let tagger = match TagVocabulary::precompute(embedder.as_ref()).await {
        Ok(vocabulary) => ZeroShotTagger::new(Some(vocabulary)),
        Err(e) => {
            warn!(error = %e, "tag vocabulary precompute failed, auto-tagging disabled");
            ZeroShotTagger::disabled()
        }
    };

    let ctx = Arc::new(PipelineContext {
        blob_store: blob_store.clone(),
        asset_store,
        analyzer: Arc::new(Analyzer),
        embedder: embedder.clone(),
        tagger,
    });

    let shutdown = CancellationToken::new();
    let bus = Arc::new(AmqpBus::new(config.rabbitmq.clone()));
    let worker = Arc::new(Worker::new(
        bus,
        ctx,
        config.rabbitmq.reconnect_delay,
        shutdown.clone(),
    ));

    let worker_handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    let state = AppState {
        embedder,
        generator,
        blob_store,
        startup_time: chrono::Utc::now(),
    };
    let router = build_router(state);

    let bind_addr = format!("{}:{}", config.service.host, config.service.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "HTTP API listening");

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();

    worker_handle.await?;
    server_handle.await?;
    info!("vibe-analysis stopped");
    Ok(())
}
