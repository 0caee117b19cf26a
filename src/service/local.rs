//! Local pipeline service backed by a store and the execution engine

use crate::core::{ExecutionRecord, ExecutionStatus, ParameterValue, Pipeline};
use crate::execution::{ExecutionEngine, SchedulingStrategy, SharedRecord, StepRunner, StopSignal};
use crate::persistence::{create_summary, default_db_path, EndpointRecord, ExecutionSummary, PipelineStore, StoredPipeline};
use crate::service::{
    EndpointSpec, PipelineService, ServiceError, SessionContext, StartOutcome, UpsertOutcome,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the local service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    pub strategy: SchedulingStrategy,

    /// Poll interval used when waiting on an execution
    pub poll_interval_ms: u64,

    /// Per-step timeout in seconds (no limit if unset)
    pub step_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            strategy: SchedulingStrategy::Sequential,
            poll_interval_ms: 500,
            step_timeout_secs: None,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_step_timeout(mut self, timeout_secs: u64) -> Self {
        self.step_timeout_secs = Some(timeout_secs);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

struct LiveExecution {
    pipeline_name: String,
    record: SharedRecord,
    stop: StopSignal,
}

type LiveExecutions = Arc<RwLock<HashMap<Uuid, LiveExecution>>>;

/// Pipeline service emulated in-process
pub struct LocalPipelineService<R> {
    store: Arc<dyn PipelineStore>,
    runner: Arc<R>,
    config: ServiceConfig,
    live: LiveExecutions,
}

impl<R: StepRunner + 'static> LocalPipelineService<R> {
    pub fn new(store: Arc<dyn PipelineStore>, runner: R, config: ServiceConfig) -> Self {
        Self {
            store,
            runner: Arc::new(runner),
            config,
            live: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open the SQLite store named by `config.db_path`
    #[cfg(feature = "sqlite")]
    pub async fn open(runner: R, config: ServiceConfig) -> Result<Self> {
        let store = crate::persistence::SqlitePipelineStore::new(&config.db_path).await?;
        Ok(Self::new(Arc::new(store), runner, config))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn authorize(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        if ctx.credential.is_empty() {
            warn!("Rejected call in {} with an empty credential", ctx.region);
            return Err(ServiceError::Unauthorized("credential is empty".to_string()));
        }
        Ok(())
    }

    fn engine(&self) -> ExecutionEngine<R> {
        let engine = ExecutionEngine::with_shared_runner(self.runner.clone(), self.config.strategy);
        match self.config.step_timeout_secs {
            Some(secs) => engine.with_step_timeout(Duration::from_secs(secs)),
            None => engine,
        }
    }

    async fn load(&self, name: &str) -> Result<StoredPipeline, ServiceError> {
        self.store
            .load_pipeline(name)
            .await?
            .ok_or_else(|| ServiceError::PipelineNotFound(name.to_string()))
    }

    fn spawn_execution(&self, pipeline: Pipeline, record: SharedRecord, stop: StopSignal) {
        let engine = self.engine();
        let store = self.store.clone();
        let live = self.live.clone();

        tokio::spawn(async move {
            engine.execute(&pipeline, record.clone(), stop).await;

            let finished = record.read().await.clone();
            // Stays tracked until saved, so readers never fall back to a stale stored record
            let mut tracked = live.write().await;
            if !tracked.contains_key(&finished.execution_id) {
                // Untracked means the pipeline was deleted while this ran
                debug!("Dropping execution {} of a deleted pipeline", finished.execution_id);
                return;
            }
            if let Err(e) = store.save_execution(&finished).await {
                error!("Failed to save execution {}: {:#}", finished.execution_id, e);
            }
            tracked.remove(&finished.execution_id);
        });
    }
}

#[async_trait]
impl<R: StepRunner + 'static> PipelineService for LocalPipelineService<R> {
    async fn upsert(&self, ctx: &SessionContext, pipeline: &Pipeline) -> Result<UpsertOutcome, ServiceError> {
        self.authorize(ctx)?;

        let definition = pipeline.definition();
        let stored = self.store.upsert_pipeline(pipeline, &definition).await?;

        info!(
            "{} pipeline {} (version {})",
            if stored.created { "Created" } else { "Updated" },
            stored.name,
            stored.version
        );
        Ok(UpsertOutcome {
            pipeline_id: stored.pipeline_id,
            version: stored.version,
            created: stored.created,
        })
    }

    async fn get_pipeline(&self, ctx: &SessionContext, name: &str) -> Result<StoredPipeline, ServiceError> {
        self.authorize(ctx)?;
        self.load(name).await
    }

    async fn list_pipelines(&self, ctx: &SessionContext) -> Result<Vec<String>, ServiceError> {
        self.authorize(ctx)?;
        Ok(self.store.list_pipelines().await?)
    }

    async fn start(
        &self,
        ctx: &SessionContext,
        pipeline_name: &str,
        overrides: &BTreeMap<String, ParameterValue>,
    ) -> Result<StartOutcome, ServiceError> {
        self.authorize(ctx)?;

        let stored = self.load(pipeline_name).await?;
        let parameters = stored
            .pipeline
            .resolve_parameters(overrides)
            .map_err(ServiceError::InvalidParameters)?;

        let mut record = ExecutionRecord::new(pipeline_name, stored.version, parameters);
        record.start();
        self.store.save_execution(&record).await?;

        let outcome = StartOutcome {
            execution_id: record.execution_id,
            status: record.status,
        };
        info!("Started execution {} of {}", outcome.execution_id, pipeline_name);

        let shared = Arc::new(RwLock::new(record));
        let stop = StopSignal::new();
        self.live.write().await.insert(
            outcome.execution_id,
            LiveExecution {
                pipeline_name: pipeline_name.to_string(),
                record: shared.clone(),
                stop: stop.clone(),
            },
        );
        self.spawn_execution(stored.pipeline, shared, stop);

        Ok(outcome)
    }

    async fn describe(&self, ctx: &SessionContext, execution_id: Uuid) -> Result<ExecutionRecord, ServiceError> {
        self.authorize(ctx)?;

        let live_record = self
            .live
            .read()
            .await
            .get(&execution_id)
            .map(|live| live.record.clone());
        if let Some(record) = live_record {
            let snapshot = record.read().await.clone();
            return Ok(snapshot);
        }

        self.store
            .load_execution(execution_id)
            .await?
            .ok_or(ServiceError::ExecutionNotFound(execution_id))
    }

    async fn stop(&self, ctx: &SessionContext, execution_id: Uuid) -> Result<(), ServiceError> {
        self.authorize(ctx)?;

        if let Some(live) = self.live.read().await.get(&execution_id) {
            // Finished but not yet saved
            if live.record.read().await.status.is_terminal() {
                return Err(ServiceError::ExecutionFinished(execution_id));
            }
            info!("Stop requested for execution {}", execution_id);
            live.stop.request();
            return Ok(());
        }

        match self.store.load_execution(execution_id).await? {
            Some(record) if record.status.is_terminal() => Err(ServiceError::ExecutionFinished(execution_id)),
            Some(mut record) => {
                // Left unfinished by a process that exited; nothing is running it
                warn!("Execution {} has no live runner, marking it stopped", execution_id);
                for step in record.steps.iter_mut().filter(|s| !s.status.is_terminal()) {
                    step.status = ExecutionStatus::Stopped;
                    step.ended_at = Some(Utc::now());
                }
                record.finish(ExecutionStatus::Stopped, None);
                self.store.save_execution(&record).await?;
                Ok(())
            }
            None => Err(ServiceError::ExecutionNotFound(execution_id)),
        }
    }

    async fn list_executions(
        &self,
        ctx: &SessionContext,
        pipeline_name: &str,
    ) -> Result<Vec<ExecutionSummary>, ServiceError> {
        self.authorize(ctx)?;

        let live = self.live.read().await;
        let mut summaries = self.store.list_executions(pipeline_name).await?;
        for summary in summaries.iter_mut() {
            if let Some(entry) = live.get(&summary.execution_id) {
                *summary = create_summary(&*entry.record.read().await);
            }
        }
        Ok(summaries)
    }

    async fn delete_pipeline(&self, ctx: &SessionContext, name: &str) -> Result<bool, ServiceError> {
        self.authorize(ctx)?;

        self.live.write().await.retain(|execution_id, live| {
            if live.pipeline_name != name {
                return true;
            }
            info!("Stopping execution {} of deleted pipeline {}", execution_id, name);
            live.stop.request();
            false
        });

        let deleted = self.store.delete_pipeline(name).await?;
        if deleted {
            info!("Deleted pipeline {}", name);
        }
        Ok(deleted)
    }

    async fn create_endpoint(&self, ctx: &SessionContext, spec: &EndpointSpec) -> Result<EndpointRecord, ServiceError> {
        self.authorize(ctx)?;

        if spec.name.is_empty() || spec.model_name.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "endpoint and model names must not be empty".to_string(),
            ));
        }

        let endpoint = EndpointRecord {
            name: spec.name.clone(),
            model_name: spec.model_name.clone(),
            created_at: Utc::now(),
        };
        self.store.save_endpoint(&endpoint).await?;
        info!("Created endpoint {} for model {}", endpoint.name, endpoint.model_name);
        Ok(endpoint)
    }

    async fn delete_endpoint(&self, ctx: &SessionContext, name: &str) -> Result<bool, ServiceError> {
        self.authorize(ctx)?;
        Ok(self.store.delete_endpoint(name).await?)
    }
}
