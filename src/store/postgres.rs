//! PostgreSQL control store.
//!
//! One transaction per batch: upsert the framework row, delete its controls,
//! insert the new set, commit. A failure anywhere rolls the whole batch back
//! (dropping an uncommitted `Transaction` rolls back too, so a cancelled
//! cycle leaves nothing behind).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use super::ControlStore;
use crate::error::StoreError;
use crate::types::{
    ControlRecord, FrameworkBatch, FrameworkMetadata, FrameworkType, IngestionCheckpoint,
};

const SCHEMA_SQL: &str = include_str!("../../migrations/001_control_sync.sql");

/// Postgres-backed [`ControlStore`].
#[derive(Clone)]
pub struct PgControlStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct FrameworkRow {
    framework_id: String,
    name: String,
    framework_type: String,
    last_updated: DateTime<Utc>,
    control_count: i64,
    source_modified: Option<DateTime<Utc>>,
    content_sha256: Option<String>,
}

impl FrameworkRow {
    fn into_metadata(self) -> Result<FrameworkMetadata, StoreError> {
        let framework_type = FrameworkType::parse(&self.framework_type).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "framework '{}' has unknown type '{}'",
                self.framework_id, self.framework_type
            ))
        })?;

        let checkpoint = (self.source_modified.is_some() || self.content_sha256.is_some())
            .then(|| IngestionCheckpoint {
                source_modified: self.source_modified,
                content_sha256: self.content_sha256,
            });

        Ok(FrameworkMetadata {
            framework_id: self.framework_id,
            name: self.name,
            framework_type,
            last_updated: self.last_updated,
            control_count: usize::try_from(self.control_count).unwrap_or_default(),
            checkpoint,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ControlRow {
    framework_id: String,
    control_id: String,
    name: String,
    description: String,
    family: String,
    requirements: String,
    guidance: String,
    last_updated: DateTime<Utc>,
    extra: Json<BTreeMap<String, serde_json::Value>>,
}

impl From<ControlRow> for ControlRecord {
    fn from(row: ControlRow) -> Self {
        Self {
            id: row.control_id,
            name: row.name,
            description: row.description,
            family: row.family,
            requirements: row.requirements,
            guidance: row.guidance,
            framework: row.framework_id,
            last_updated: row.last_updated,
            extra: row.extra.0,
        }
    }
}

impl PgControlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ControlStore for PgControlStore {
    async fn replace_framework_controls(
        &self,
        batch: FrameworkBatch,
    ) -> Result<FrameworkMetadata, StoreError> {
        let now = Utc::now();
        let records = batch.normalized_records(now);
        let checkpoint = batch.checkpoint.clone().unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO control_frameworks
                (framework_id, name, framework_type, last_updated, control_count,
                 source_modified, content_sha256)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (framework_id) DO UPDATE SET
                name = EXCLUDED.name,
                framework_type = EXCLUDED.framework_type,
                last_updated = EXCLUDED.last_updated,
                control_count = EXCLUDED.control_count,
                source_modified = EXCLUDED.source_modified,
                content_sha256 = EXCLUDED.content_sha256
            "#,
        )
        .bind(&batch.framework_id)
        .bind(&batch.name)
        .bind(batch.framework_type.as_str())
        .bind(now)
        .bind(records.len() as i64)
        .bind(checkpoint.source_modified)
        .bind(checkpoint.content_sha256.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM control_records WHERE framework_id = $1")
            .bind(&batch.framework_id)
            .execute(&mut *tx)
            .await?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO control_records
                    (framework_id, control_id, name, description, family,
                     requirements, guidance, last_updated, extra)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&batch.framework_id)
            .bind(&record.id)
            .bind(&record.name)
            .bind(&record.description)
            .bind(&record.family)
            .bind(&record.requirements)
            .bind(&record.guidance)
            .bind(record.last_updated)
            .bind(Json(&record.extra))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::BatchAborted {
                framework_id: batch.framework_id.clone(),
                reason: format!("insert of control '{}' failed: {e}", record.id),
            })?;
        }

        tx.commit().await?;

        tracing::debug!(
            framework_id = %batch.framework_id,
            controls = records.len(),
            "Committed control batch"
        );

        Ok(FrameworkMetadata {
            control_count: records.len(),
            framework_id: batch.framework_id,
            name: batch.name,
            framework_type: batch.framework_type,
            last_updated: now,
            checkpoint: batch.checkpoint,
        })
    }

    async fn read_framework_controls(
        &self,
        framework_id: &str,
    ) -> Result<Vec<ControlRecord>, StoreError> {
        let rows: Vec<ControlRow> = sqlx::query_as(
            r#"
            SELECT framework_id, control_id, name, description, family,
                   requirements, guidance, last_updated, extra
            FROM control_records
            WHERE framework_id = $1
            ORDER BY control_id
            "#,
        )
        .bind(framework_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ControlRecord::from).collect())
    }

    async fn read_all_frameworks(&self) -> Result<Vec<FrameworkMetadata>, StoreError> {
        let rows: Vec<FrameworkRow> = sqlx::query_as(
            r#"
            SELECT framework_id, name, framework_type, last_updated, control_count,
                   source_modified, content_sha256
            FROM control_frameworks
            ORDER BY framework_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FrameworkRow::into_metadata).collect()
    }

    async fn read_framework(
        &self,
        framework_id: &str,
    ) -> Result<Option<FrameworkMetadata>, StoreError> {
        let row: Option<FrameworkRow> = sqlx::query_as(
            r#"
            SELECT framework_id, name, framework_type, last_updated, control_count,
                   source_modified, content_sha256
            FROM control_frameworks
            WHERE framework_id = $1
            "#,
        )
        .bind(framework_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FrameworkRow::into_metadata).transpose()
    }

    async fn record_checkpoint(
        &self,
        framework_id: &str,
        checkpoint: IngestionCheckpoint,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE control_frameworks
            SET source_modified = $2, content_sha256 = $3
            WHERE framework_id = $1
            "#,
        )
        .bind(framework_id)
        .bind(checkpoint.source_modified)
        .bind(checkpoint.content_sha256.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
