//! Test: Failure Passthrough - the first failure ends the execution verbatim

use super::MODEL_PIPELINE;
use crate::helpers::*;
use ml_pipeline::core::ExecutionStatus;
use ml_pipeline::execution::{SchedulingStrategy, StaticRunner};
use serde_json::json;
use std::collections::BTreeMap;

/// A failing training job stops everything downstream
#[tokio::test]
async fn test_training_failure_passes_through() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);
    let runner = runner_with_accuracy(0.99).with_failure("Train", "ResourceLimitExceeded: ml.p3.16xlarge");

    let result = run_pipeline_with_runner(&pipeline, runner).await;

    assert_execution_failed(&result, "ResourceLimitExceeded: ml.p3.16xlarge");
    assert_step_status(&result, "Preprocess", ExecutionStatus::Succeeded);
    assert_step_status(&result, "Train", ExecutionStatus::Failed);
    assert_step_not_entered(&result, "Evaluate");
    assert_step_not_entered(&result, "CheckAccuracy");
    assert_call_order(&result, &["Preprocess", "Train"]);

    let train = result.record.step("Train").unwrap();
    assert_eq!(
        train.failure_reason.as_deref(),
        Some("ResourceLimitExceeded: ml.p3.16xlarge")
    );
}

/// A failure inside the chosen arm fails the whole execution
#[tokio::test]
async fn test_branch_step_failure_fails_execution() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);
    let runner = runner_with_accuracy(0.99).with_failure("RegisterModel", "model package group not found");

    let result = run_pipeline_with_runner(&pipeline, runner).await;

    assert_execution_failed(&result, "model package group not found");
    assert_step_status(&result, "CheckAccuracy", ExecutionStatus::Succeeded);
    assert_step_status(&result, "RegisterModel", ExecutionStatus::Failed);
}

/// A report without the metric cannot be compared, so the condition itself fails
#[tokio::test]
async fn test_missing_metric_fails_condition() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);
    let runner = StaticRunner::new().with_output("Evaluate", "report", json!({ "metrics": {} }));

    let result = run_pipeline_with_runner(&pipeline, runner).await;

    assert_eq!(result.record.status, ExecutionStatus::Failed);
    assert_step_status(&result, "CheckAccuracy", ExecutionStatus::Failed);
    assert_step_not_entered(&result, "RegisterModel");
    assert_step_not_entered(&result, "Notify");
    assert!(result.record.failure_reason.is_some());
}

/// Independent steps already running are drained, but nothing new starts
#[tokio::test]
async fn test_parallel_failure_drains_in_flight_steps() {
    let yaml = r#"
name: "fan-out"
steps:
  - name: Fast
    kind: process
    payload: { script: fast.py }
    outputs: [out]
  - name: Slow
    kind: process
    payload: { script: slow.py }
    outputs: [out]
  - name: Join
    kind: data-callback
    depends_on: [Fast, Slow]
"#;
    let pipeline = pipeline_from_yaml(yaml);
    let runner = StaticRunner::new()
        .with_failure("Fast", "quota exceeded")
        .with_delay(std::time::Duration::from_millis(20));

    let result = run_pipeline_with_parameters(&pipeline, runner, BTreeMap::new(), SchedulingStrategy::Parallel).await;

    assert_execution_failed(&result, "quota exceeded");
    assert_step_status(&result, "Fast", ExecutionStatus::Failed);
    assert_step_status(&result, "Slow", ExecutionStatus::Succeeded);
    assert_step_not_entered(&result, "Join");
}
