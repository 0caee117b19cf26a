//! Execution state models

use crate::core::{condition::Branch, parameter::ParameterValue, step::StepKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Status of an execution or of a single step within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Not started yet
    Pending,
    /// Currently running
    Executing,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Stopped on request before finishing
    Stopped,
}

impl ExecutionStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Executing" => Ok(ExecutionStatus::Executing),
            "Succeeded" => Ok(ExecutionStatus::Succeeded),
            "Failed" => Ok(ExecutionStatus::Failed),
            "Stopped" => Ok(ExecutionStatus::Stopped),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// Record of one step that was entered during an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub kind: StepKind,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Declared outputs produced by the step
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,

    /// Arm selected by a condition step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Branch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StepRecord {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            status: ExecutionStatus::Pending,
            started_at: None,
            ended_at: None,
            outputs: BTreeMap::new(),
            outcome: None,
            failure_reason: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, outputs: BTreeMap<String, Value>) {
        self.status = ExecutionStatus::Succeeded;
        self.outputs = outputs;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.ended_at = Some(Utc::now());
    }
}

/// State of one pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub pipeline_name: String,

    /// Definition version the execution was started from
    pub pipeline_version: u32,

    pub status: ExecutionStatus,

    /// Effective parameter values (defaults merged with overrides)
    pub parameters: BTreeMap<String, ParameterValue>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Failure passed through from the step that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Entered steps, in the order they were started
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl ExecutionRecord {
    pub fn new(
        pipeline_name: impl Into<String>,
        pipeline_version: u32,
        parameters: BTreeMap<String, ParameterValue>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            pipeline_version,
            status: ExecutionStatus::Pending,
            parameters,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            failure_reason: None,
            steps: Vec::new(),
        }
    }

    /// Mark execution as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    /// Mark execution as finished with the given terminal status
    pub fn finish(&mut self, status: ExecutionStatus, failure_reason: Option<String>) {
        self.status = status;
        self.failure_reason = failure_reason;
        self.ended_at = Some(Utc::now());
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut StepRecord> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Names of the steps that were entered
    pub fn entered_steps(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn count_with_status(&self, status: ExecutionStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}
