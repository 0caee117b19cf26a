//! SQLite-based persistence store

use crate::core::{ExecutionRecord, Pipeline, PipelineDefinition};
use crate::persistence::{create_summary, default_db_path, EndpointRecord, ExecutionSummary, PipelineStore, StoredPipeline};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// SQLite pipeline store
pub struct SqlitePipelineStore {
    pool: SqlitePool,
}

impl SqlitePipelineStore {
    /// Open (creating if needed) a store at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Opened pipeline store at {}", db_path.display());
        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Private in-memory database, kept on a single connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        Self::new(&default_db_path()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pipelines (
                name TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                pipeline TEXT NOT NULL,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                pipeline_version INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                record TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_name ON executions(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_status ON executions(status);
            CREATE INDEX IF NOT EXISTS idx_created_at ON executions(created_at);

            CREATE TABLE IF NOT EXISTS endpoints (
                name TEXT PRIMARY KEY,
                model_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<u32> {
        let version = row.get::<i64, _>("version");
        u32::try_from(version).with_context(|| format!("Stored pipeline version {} is out of range", version))
    }

    fn pipeline_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredPipeline> {
        let pipeline: Pipeline =
            serde_json::from_str(&row.get::<String, _>("pipeline")).context("Stored pipeline is corrupt")?;
        let definition: PipelineDefinition =
            serde_json::from_str(&row.get::<String, _>("definition")).context("Stored definition is corrupt")?;

        Ok(StoredPipeline {
            pipeline_id: row.get("pipeline_id"),
            name: row.get("name"),
            version: Self::version_from_row(row)?,
            pipeline,
            definition,
            created: false,
            created_at: Self::from_naive(row.get("created_at")),
            updated_at: Self::from_naive(row.get("updated_at")),
        })
    }
}

#[async_trait::async_trait]
impl PipelineStore for SqlitePipelineStore {
    async fn upsert_pipeline(&self, pipeline: &Pipeline, definition: &PipelineDefinition) -> Result<StoredPipeline> {
        let pipeline_json = serde_json::to_string(pipeline)?;
        let definition_json = serde_json::to_string(definition)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let existing = sqlx::query("SELECT pipeline_id, version, created_at FROM pipelines WHERE name = ?1")
            .bind(pipeline.name())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load pipeline")?;

        let stored = match existing {
            Some(row) => {
                let version = Self::version_from_row(&row)?
                    .checked_add(1)
                    .context("Pipeline version limit reached")?;
                sqlx::query(
                    r#"
                    UPDATE pipelines
                    SET version = ?2, pipeline = ?3, definition = ?4, updated_at = ?5
                    WHERE name = ?1
                    "#,
                )
                .bind(pipeline.name())
                .bind(version as i64)
                .bind(&pipeline_json)
                .bind(&definition_json)
                .bind(Self::to_naive(now))
                .execute(&mut *tx)
                .await
                .context("Failed to update pipeline")?;

                StoredPipeline {
                    pipeline_id: row.get("pipeline_id"),
                    name: pipeline.name().to_string(),
                    version,
                    pipeline: pipeline.clone(),
                    definition: definition.clone(),
                    created: false,
                    created_at: Self::from_naive(row.get("created_at")),
                    updated_at: now,
                }
            }
            None => {
                let pipeline_id = Uuid::new_v4().to_string();
                sqlx::query(
                    r#"
                    INSERT INTO pipelines
                    (name, pipeline_id, version, pipeline, definition, created_at, updated_at)
                    VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5)
                    "#,
                )
                .bind(pipeline.name())
                .bind(&pipeline_id)
                .bind(&pipeline_json)
                .bind(&definition_json)
                .bind(Self::to_naive(now))
                .execute(&mut *tx)
                .await
                .context("Failed to insert pipeline")?;

                StoredPipeline {
                    pipeline_id,
                    name: pipeline.name().to_string(),
                    version: 1,
                    pipeline: pipeline.clone(),
                    definition: definition.clone(),
                    created: true,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        tx.commit().await.context("Failed to commit pipeline")?;
        Ok(stored)
    }

    async fn load_pipeline(&self, name: &str) -> Result<Option<StoredPipeline>> {
        let row = sqlx::query(
            r#"
            SELECT name, pipeline_id, version, pipeline, definition, created_at, updated_at
            FROM pipelines
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load pipeline")?;

        row.as_ref().map(Self::pipeline_from_row).transpose()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM pipelines ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn delete_pipeline(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM executions WHERE pipeline_name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .context("Failed to delete executions")?;
        let result = sqlx::query("DELETE FROM pipelines WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .context("Failed to delete pipeline")?;

        tx.commit().await.context("Failed to commit delete")?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, pipeline_name, pipeline_version, status, created_at, record)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(record.execution_id.to_string())
        .bind(&record.pipeline_name)
        .bind(record.pipeline_version as i64)
        .bind(record.status.to_string())
        .bind(Self::to_naive(record.created_at))
        .bind(serde_json::to_string(record)?)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query("SELECT record FROM executions WHERE id = ?1")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        match row {
            Some(row) => {
                let record = serde_json::from_str(&row.get::<String, _>("record"))
                    .context("Stored execution is corrupt")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT record
            FROM executions
            WHERE pipeline_name = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter()
            .map(|row| {
                let record: ExecutionRecord = serde_json::from_str(&row.get::<String, _>("record"))
                    .context("Stored execution is corrupt")?;
                Ok(create_summary(&record))
            })
            .collect()
    }

    async fn save_endpoint(&self, endpoint: &EndpointRecord) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO endpoints (name, model_name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&endpoint.name)
            .bind(&endpoint.model_name)
            .bind(Self::to_naive(endpoint.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to save endpoint")?;

        Ok(())
    }

    async fn load_endpoint(&self, name: &str) -> Result<Option<EndpointRecord>> {
        let row = sqlx::query("SELECT name, model_name, created_at FROM endpoints WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load endpoint")?;

        Ok(row.map(|row| EndpointRecord {
            name: row.get("name"),
            model_name: row.get("model_name"),
            created_at: Self::from_naive(row.get("created_at")),
        }))
    }

    async fn delete_endpoint(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM endpoints WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to delete endpoint")?;

        Ok(result.rows_affected() > 0)
    }
}
