//! Step runners - perform the work behind a non-condition step

use crate::core::step::{Payload, StepKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error types for step runs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// Failure reported by the work itself; its message is passed through verbatim
    #[error("{0}")]
    Failed(String),

    #[error("step '{step}' did not produce declared output '{output}'")]
    MissingOutput { step: String, output: String },

    #[error("cannot resolve input '{input}': {reason}")]
    Unresolved { input: String, reason: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

/// A step with every input resolved to a concrete value
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    pub execution_id: Uuid,
    pub name: String,
    pub kind: StepKind,
    pub payload: Option<Payload>,
    pub inputs: BTreeMap<String, Value>,

    /// Output names the step must produce
    pub outputs: Vec<String>,
}

/// Trait for step execution - allows for different implementations
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run the step and return its outputs
    async fn run(&self, step: &ResolvedStep) -> Result<BTreeMap<String, Value>, StepError>;
}

/// Runner serving outputs from a fixed table.
///
/// Outputs missing from the table are filled with a synthetic artifact URI,
/// and steps registered with [`StaticRunner::with_failure`] fail with the
/// given message.
#[derive(Debug, Clone, Default)]
pub struct StaticRunner {
    outputs: HashMap<String, BTreeMap<String, Value>>,
    failures: HashMap<String, String>,
    delay: Option<Duration>,
}

impl StaticRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` for `step.output`
    pub fn with_output(mut self, step: impl Into<String>, output: impl Into<String>, value: Value) -> Self {
        self.outputs
            .entry(step.into())
            .or_default()
            .insert(output.into(), value);
        self
    }

    pub fn with_failure(mut self, step: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(step.into(), message.into());
        self
    }

    /// Sleep before every step, to emulate slow jobs
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Synthetic location of an artifact produced locally
pub fn artifact_uri(execution_id: Uuid, step: &str, output: &str) -> String {
    format!("local://{}/{}/{}", execution_id, step, output)
}

#[async_trait]
impl StepRunner for StaticRunner {
    async fn run(&self, step: &ResolvedStep) -> Result<BTreeMap<String, Value>, StepError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failures.get(&step.name) {
            return Err(StepError::Failed(message.clone()));
        }

        let table = self.outputs.get(&step.name);
        let outputs = step
            .outputs
            .iter()
            .map(|output| {
                let value = table
                    .and_then(|t| t.get(output))
                    .cloned()
                    .unwrap_or_else(|| Value::String(artifact_uri(step.execution_id, &step.name, output)));
                (output.clone(), value)
            })
            .collect();

        Ok(outputs)
    }
}
