//! Pipeline service interface
//!
//! Every call takes an explicit [`SessionContext`]; there is no ambient
//! session. [`local::LocalPipelineService`] implements the interface against
//! a local store and the execution engine.

pub mod local;

pub use local::{LocalPipelineService, ServiceConfig};

use crate::core::{ExecutionRecord, ExecutionStatus, ParameterError, ParameterValue, Pipeline};
use crate::persistence::{EndpointRecord, ExecutionSummary, StoredPipeline};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Access key pair used to sign service calls
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credential {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_key_id.is_empty() || self.secret_access_key.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Region, execution role and credential for a service call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub region: String,

    /// Role the service assumes to run steps
    pub role_arn: Option<String>,

    pub credential: Credential,
}

impl SessionContext {
    pub fn new(region: impl Into<String>, credential: Credential) -> Self {
        Self {
            region: region.into(),
            role_arn: None,
            credential,
        }
    }

    pub fn with_role(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }
}

/// Error types for service calls
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request is not authorized: {0}")]
    Unauthorized(String),

    #[error("pipeline '{0}' does not exist")]
    PipelineNotFound(String),

    #[error("execution {0} does not exist")]
    ExecutionNotFound(Uuid),

    #[error("invalid parameters: {}", join_errors(.0))]
    InvalidParameters(Vec<ParameterError>),

    #[error("execution {0} has already finished")]
    ExecutionFinished(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn join_errors(errors: &[ParameterError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Result of submitting a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub pipeline_id: String,
    pub version: u32,

    /// False when an existing definition was replaced
    pub created: bool,
}

/// Result of starting an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
}

/// Model endpoint to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    pub model_name: String,
}

/// Resources to remove after a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownRequest {
    pub pipeline_name: Option<String>,
    pub endpoints: Vec<String>,
}

/// What a teardown actually removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub pipeline_deleted: bool,
    pub endpoints_deleted: Vec<String>,

    /// Requested endpoints that did not exist
    pub endpoints_missing: Vec<String>,
}

/// Remote pipeline service operations
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Create or replace the definition stored under the pipeline's name
    async fn upsert(&self, ctx: &SessionContext, pipeline: &Pipeline) -> Result<UpsertOutcome, ServiceError>;

    async fn get_pipeline(&self, ctx: &SessionContext, name: &str) -> Result<StoredPipeline, ServiceError>;

    async fn list_pipelines(&self, ctx: &SessionContext) -> Result<Vec<String>, ServiceError>;

    /// Start an execution; overrides are checked against the stored parameters
    async fn start(
        &self,
        ctx: &SessionContext,
        pipeline_name: &str,
        overrides: &BTreeMap<String, ParameterValue>,
    ) -> Result<StartOutcome, ServiceError>;

    async fn describe(&self, ctx: &SessionContext, execution_id: Uuid) -> Result<ExecutionRecord, ServiceError>;

    /// Request a stop; the execution ends Stopped once in-flight work is cancelled
    async fn stop(&self, ctx: &SessionContext, execution_id: Uuid) -> Result<(), ServiceError>;

    async fn list_executions(
        &self,
        ctx: &SessionContext,
        pipeline_name: &str,
    ) -> Result<Vec<ExecutionSummary>, ServiceError>;

    /// Returns false if no such pipeline existed
    async fn delete_pipeline(&self, ctx: &SessionContext, name: &str) -> Result<bool, ServiceError>;

    async fn create_endpoint(&self, ctx: &SessionContext, spec: &EndpointSpec) -> Result<EndpointRecord, ServiceError>;

    /// Returns false if no such endpoint existed
    async fn delete_endpoint(&self, ctx: &SessionContext, name: &str) -> Result<bool, ServiceError>;
}

/// Poll `describe` until the execution reaches a terminal status
pub async fn wait_for<S: PipelineService + ?Sized>(
    service: &S,
    ctx: &SessionContext,
    execution_id: Uuid,
    poll: Duration,
) -> Result<ExecutionRecord, ServiceError> {
    loop {
        let record = service.describe(ctx, execution_id).await?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        debug!("Execution {} is {}, polling again", execution_id, record.status);
        tokio::time::sleep(poll).await;
    }
}

/// Delete a pipeline definition and a set of endpoints by name
pub async fn teardown<S: PipelineService + ?Sized>(
    service: &S,
    ctx: &SessionContext,
    request: &TeardownRequest,
) -> Result<TeardownReport, ServiceError> {
    let mut report = TeardownReport::default();

    for endpoint in &request.endpoints {
        if service.delete_endpoint(ctx, endpoint).await? {
            report.endpoints_deleted.push(endpoint.clone());
        } else {
            report.endpoints_missing.push(endpoint.clone());
        }
    }

    if let Some(name) = &request.pipeline_name {
        report.pipeline_deleted = service.delete_pipeline(ctx, name).await?;
    }

    info!(
        "Teardown removed {} endpoint(s); pipeline deleted: {}",
        report.endpoints_deleted.len(),
        report.pipeline_deleted
    );
    Ok(report)
}
