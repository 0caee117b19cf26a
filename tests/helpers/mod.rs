//! Test utility functions for ml-pipeline

#![allow(dead_code)]

use ml_pipeline::core::config::PipelineConfig;
use ml_pipeline::core::{
    Branch, ExecutionRecord, ExecutionStatus, ParameterValue, Pipeline,
};
use ml_pipeline::execution::{
    ExecutionEngine, ExecutionEvent, ResolvedStep, SchedulingStrategy, StaticRunner, StepError, StepRunner,
};
use ml_pipeline::persistence::InMemoryPipelineStore;
use ml_pipeline::service::{Credential, LocalPipelineService, ServiceConfig, SessionContext};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Runner that records every step it receives before delegating to a `StaticRunner`
pub struct RecordingRunner {
    inner: StaticRunner,
    calls: Arc<Mutex<Vec<ResolvedStep>>>,
}

impl RecordingRunner {
    pub fn new(inner: StaticRunner) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle onto the call log that survives moving the runner into an engine
    pub fn calls(&self) -> Arc<Mutex<Vec<ResolvedStep>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl StepRunner for RecordingRunner {
    async fn run(&self, step: &ResolvedStep) -> Result<BTreeMap<String, Value>, StepError> {
        self.calls.lock().unwrap().push(step.clone());
        self.inner.run(step).await
    }
}

/// Test result from running a pipeline
pub struct PipelineTestResult {
    pub record: ExecutionRecord,
    pub events: Vec<ExecutionEvent>,
    pub calls: Vec<ResolvedStep>,
    pub duration_ms: u64,
}

impl PipelineTestResult {
    /// Names of the steps the runner was asked to run, in call order
    pub fn called_steps(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn call(&self, step: &str) -> Option<&ResolvedStep> {
        self.calls.iter().find(|c| c.name == step)
    }
}

/// Parse a YAML pipeline, panicking with the validation errors if it is rejected
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    let config = PipelineConfig::from_yaml(yaml).expect("pipeline YAML should parse");
    match config.to_pipeline() {
        Ok(pipeline) => pipeline,
        Err(e) => panic!("pipeline should validate: {:?}", e.errors()),
    }
}

/// Run a pipeline with default parameters and the given runner table
pub async fn run_pipeline_with_runner(pipeline: &Pipeline, runner: StaticRunner) -> PipelineTestResult {
    run_pipeline_with_parameters(pipeline, runner, BTreeMap::new(), SchedulingStrategy::Sequential).await
}

/// Run a pipeline with explicit overrides and scheduling strategy
pub async fn run_pipeline_with_parameters(
    pipeline: &Pipeline,
    runner: StaticRunner,
    overrides: BTreeMap<String, ParameterValue>,
    strategy: SchedulingStrategy,
) -> PipelineTestResult {
    let parameters = pipeline
        .resolve_parameters(&overrides)
        .expect("overrides should resolve");

    let runner = RecordingRunner::new(runner);
    let calls = runner.calls();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let engine = ExecutionEngine::new(runner, strategy)
        .with_event_handler(move |event| sink.lock().unwrap().push(event));

    let start = std::time::Instant::now();
    let record = engine.run(pipeline, parameters).await;
    let duration = start.elapsed();

    let events = events.lock().unwrap().clone();
    let calls = calls.lock().unwrap().clone();
    PipelineTestResult {
        record,
        events,
        calls,
        duration_ms: duration.as_millis() as u64,
    }
}

/// Runner table where `Evaluate.report` carries the given accuracy
pub fn runner_with_accuracy(accuracy: f64) -> StaticRunner {
    StaticRunner::new().with_output(
        "Evaluate",
        "report",
        json!({ "metrics": { "accuracy": { "value": accuracy } } }),
    )
}

pub fn ctx() -> SessionContext {
    SessionContext::new("us-east-1", Credential::new("AKIDTEST", "test-secret"))
}

/// Local service over an in-memory store with a fast poll interval
pub fn local_service(runner: StaticRunner) -> LocalPipelineService<StaticRunner> {
    LocalPipelineService::new(
        Arc::new(InMemoryPipelineStore::new()),
        runner,
        ServiceConfig::new().with_poll_interval(10),
    )
}

/// Assert that the execution finished successfully
pub fn assert_execution_succeeded(result: &PipelineTestResult) {
    assert_eq!(
        result.record.status,
        ExecutionStatus::Succeeded,
        "execution should succeed, failure: {:?}",
        result.record.failure_reason
    );
    assert!(result.record.failure_reason.is_none());
}

/// Assert that the execution failed with exactly `reason`
pub fn assert_execution_failed(result: &PipelineTestResult, reason: &str) {
    assert_eq!(result.record.status, ExecutionStatus::Failed);
    assert_eq!(result.record.failure_reason.as_deref(), Some(reason));
}

pub fn assert_step_status(result: &PipelineTestResult, step: &str, status: ExecutionStatus) {
    let record = result
        .record
        .step(step)
        .unwrap_or_else(|| panic!("step '{}' should have been entered", step));
    assert_eq!(record.status, status, "unexpected status for step '{}'", step);
}

pub fn assert_step_not_entered(result: &PipelineTestResult, step: &str) {
    assert!(
        result.record.step(step).is_none(),
        "step '{}' should not have been entered",
        step
    );
    assert!(
        result.call(step).is_none(),
        "runner should not have been asked to run '{}'",
        step
    );
}

pub fn assert_branch_taken(result: &PipelineTestResult, step: &str, branch: Branch) {
    let record = result
        .record
        .step(step)
        .unwrap_or_else(|| panic!("condition '{}' should have been entered", step));
    assert_eq!(record.outcome, Some(branch), "unexpected outcome for '{}'", step);
}

/// Assert the runner saw the steps in exactly this order
pub fn assert_call_order(result: &PipelineTestResult, expected: &[&str]) {
    assert_eq!(result.called_steps(), expected);
}
