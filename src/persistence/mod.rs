//! Persistence layer for pipeline definitions, executions and endpoints

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqlitePipelineStore;

use crate::core::{ExecutionRecord, ExecutionStatus, Pipeline, PipelineDefinition};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default database location under the user's local data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ml-pipeline")
        .join("pipelines.db")
}

/// A submitted pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPipeline {
    /// Opaque id, stable across upserts of the same name
    pub pipeline_id: String,

    pub name: String,

    /// Starts at 1 and increases on every upsert
    pub version: u32,

    pub pipeline: Pipeline,
    pub definition: PipelineDefinition,

    /// Whether this upsert created the pipeline (false when it replaced one)
    #[serde(default)]
    pub created: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A model endpoint registered by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub name: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
}

/// Summary of a pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    pub pipeline_version: u32,

    /// Execution status
    pub status: ExecutionStatus,

    pub created_at: DateTime<Utc>,

    /// When execution ended (if it has)
    pub ended_at: Option<DateTime<Utc>>,

    /// Number of steps entered
    pub entered_steps: usize,

    /// Number of steps that succeeded
    pub succeeded_steps: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Create a summary from an execution record
pub fn create_summary(record: &ExecutionRecord) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: record.execution_id,
        pipeline_name: record.pipeline_name.clone(),
        pipeline_version: record.pipeline_version,
        status: record.status,
        created_at: record.created_at,
        ended_at: record.ended_at,
        entered_steps: record.steps.len(),
        succeeded_steps: record.count_with_status(ExecutionStatus::Succeeded),
        failure_reason: record.failure_reason.clone(),
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert a definition or replace the existing one, bumping its version
    async fn upsert_pipeline(&self, pipeline: &Pipeline, definition: &PipelineDefinition) -> Result<StoredPipeline>;

    async fn load_pipeline(&self, name: &str) -> Result<Option<StoredPipeline>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;

    /// Delete a definition and its executions. Returns false if it did not exist.
    async fn delete_pipeline(&self, name: &str) -> Result<bool>;

    /// Save (or overwrite) an execution record
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>>;

    /// List executions for a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    async fn save_endpoint(&self, endpoint: &EndpointRecord) -> Result<()>;

    async fn load_endpoint(&self, name: &str) -> Result<Option<EndpointRecord>>;

    /// Returns false if the endpoint did not exist
    async fn delete_endpoint(&self, name: &str) -> Result<bool>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPipelineStore {
    pipelines: RwLock<HashMap<String, StoredPipeline>>,
    executions: RwLock<HashMap<Uuid, ExecutionRecord>>,
    endpoints: RwLock<HashMap<String, EndpointRecord>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn upsert_pipeline(&self, pipeline: &Pipeline, definition: &PipelineDefinition) -> Result<StoredPipeline> {
        let mut pipelines = self.pipelines.write().await;
        let now = Utc::now();

        let stored = match pipelines.get(pipeline.name()) {
            Some(existing) => StoredPipeline {
                pipeline_id: existing.pipeline_id.clone(),
                name: existing.name.clone(),
                version: existing.version + 1,
                pipeline: pipeline.clone(),
                definition: definition.clone(),
                created: false,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => StoredPipeline {
                pipeline_id: Uuid::new_v4().to_string(),
                name: pipeline.name().to_string(),
                version: 1,
                pipeline: pipeline.clone(),
                definition: definition.clone(),
                created: true,
                created_at: now,
                updated_at: now,
            },
        };

        pipelines.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn load_pipeline(&self, name: &str) -> Result<Option<StoredPipeline>> {
        Ok(self.pipelines.read().await.get(name).cloned())
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.pipelines.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_pipeline(&self, name: &str) -> Result<bool> {
        let removed = self.pipelines.write().await.remove(name).is_some();
        self.executions
            .write()
            .await
            .retain(|_, record| record.pipeline_name != name);
        Ok(removed)
    }

    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(record.execution_id, record.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>> {
        Ok(self.executions.read().await.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let executions = self.executions.read().await;
        let mut summaries: Vec<ExecutionSummary> = executions
            .values()
            .filter(|record| record.pipeline_name == pipeline_name)
            .map(create_summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn save_endpoint(&self, endpoint: &EndpointRecord) -> Result<()> {
        self.endpoints
            .write()
            .await
            .insert(endpoint.name.clone(), endpoint.clone());
        Ok(())
    }

    async fn load_endpoint(&self, name: &str) -> Result<Option<EndpointRecord>> {
        Ok(self.endpoints.read().await.get(name).cloned())
    }

    async fn delete_endpoint(&self, name: &str) -> Result<bool> {
        Ok(self.endpoints.write().await.remove(name).is_some())
    }
}
