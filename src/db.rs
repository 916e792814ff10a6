//! Persistence gateway for the shared `assets` table
//!
//! The pipeline only writes outcomes; it never reads prior status. Both
//! updates are idempotent single-row conditional writes scoped to
//! non-deleted records.

use crate::models::{AnalysisResult, STATUS_ANALYSIS_FAILED, STATUS_ANALYZED};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::{info, warn};

/// Persistence contract, seam for worker tests
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Write the success outcome: analysis fields plus optional embedding
    /// and tags, and flip the status to analyzed
    async fn record_success(
        &self,
        asset_id: i64,
        result: &AnalysisResult,
        embedding: Option<&[f32]>,
        tags: Option<&str>,
    ) -> Result<()>;

    /// Mark the asset as failed analysis
    async fn record_failure(&self, asset_id: i64) -> Result<()>;
}

/// Audio asset missing its embedding vector (backfill scan row)
#[derive(Debug, Clone)]
pub struct VectorlessAsset {
    pub id: i64,
    pub storage_name: String,
}

/// Read/write surface for the vector backfill tool
#[async_trait]
pub trait BackfillStore: Send + Sync {
    /// Non-deleted audio assets with no stored embedding vector
    async fn vectorless_assets(&self) -> Result<Vec<VectorlessAsset>>;

    /// Write only the embedding vector, leaving analysis fields untouched
    async fn store_vector(&self, asset_id: i64, vector: &[f32]) -> Result<()>;
}

/// Connect the MySQL pool
pub async fn connect_pool(url: &str) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;
    info!("database connection established");
    Ok(pool)
}

/// MySQL-backed asset store
pub struct MySqlAssetStore {
    pool: MySqlPool,
}

impl MySqlAssetStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for MySqlAssetStore {
    async fn record_success(
        &self,
        asset_id: i64,
        result: &AnalysisResult,
        embedding: Option<&[f32]>,
        tags: Option<&str>,
    ) -> Result<()> {
        let vector_json = embedding.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            UPDATE assets
            SET bpm = ?,
                musical_key = ?,
                duration = ?,
                audio_vector = ?,
                auto_tags = ?,
                status = ?
            WHERE id = ?
              AND deleted = 0
            "#,
        )
        .bind(result.bpm)
        .bind(&result.key)
        .bind(result.duration as i64)
        .bind(&vector_json)
        .bind(tags)
        .bind(STATUS_ANALYZED)
        .bind(asset_id)
        .execute(&self.pool)
        .await?;

        info!(
            asset_id = asset_id,
            bpm = result.bpm,
            key = %result.key,
            duration_seconds = result.duration,
            has_vector = embedding.is_some(),
            tags = tags.unwrap_or("none"),
            "analysis result persisted"
        );
        Ok(())
    }

    async fn record_failure(&self, asset_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE assets
            SET status = ?
            WHERE id = ?
              AND deleted = 0
            "#,
        )
        .bind(STATUS_ANALYSIS_FAILED)
        .bind(asset_id)
        .execute(&self.pool)
        .await?;

        warn!(asset_id = asset_id, "asset marked as analysis failed");
        Ok(())
    }
}

#[async_trait]
impl BackfillStore for MySqlAssetStore {
    async fn vectorless_assets(&self) -> Result<Vec<VectorlessAsset>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, storage_name
            FROM assets
            WHERE deleted = 0
              AND type = 'AUDIO'
              AND audio_vector IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, storage_name)| VectorlessAsset { id, storage_name })
            .collect())
    }

    async fn store_vector(&self, asset_id: i64, vector: &[f32]) -> Result<()> {
        let vector_json = serde_json::to_string(vector)?;
        sqlx::query("UPDATE assets SET audio_vector = ? WHERE id = ?")
            .bind(vector_json)
            .bind(asset_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
