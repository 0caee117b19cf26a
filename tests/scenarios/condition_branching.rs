//! Test: Condition Branching - exactly one arm runs per condition

use super::MODEL_PIPELINE;
use crate::helpers::*;
use ml_pipeline::core::{Branch, ExecutionStatus, ParameterValue};
use ml_pipeline::execution::{ExecutionEvent, SchedulingStrategy, StaticRunner};
use serde_json::json;
use std::collections::BTreeMap;

/// Accurate model takes the then arm and registers the trained artifacts
#[tokio::test]
async fn test_accurate_model_is_registered() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let result = run_pipeline_with_runner(&pipeline, runner_with_accuracy(0.97)).await;

    assert_execution_succeeded(&result);
    assert_branch_taken(&result, "CheckAccuracy", Branch::Then);
    assert_step_status(&result, "RegisterModel", ExecutionStatus::Succeeded);
    assert_step_not_entered(&result, "Notify");
    assert_call_order(&result, &["Preprocess", "Train", "Evaluate", "RegisterModel"]);

    // Branch steps see outputs from before the condition
    let register = result.call("RegisterModel").unwrap();
    let model_data = register.inputs["model_data"].as_str().unwrap();
    assert!(model_data.ends_with("/Train/model_artifacts"), "got {}", model_data);
    assert_eq!(register.inputs["approval_status"], json!("PendingManualApproval"));
}

/// Inaccurate model takes the else arm; nothing is registered
#[tokio::test]
async fn test_inaccurate_model_triggers_notification() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let result = run_pipeline_with_runner(&pipeline, runner_with_accuracy(0.42)).await;

    assert_execution_succeeded(&result);
    assert_branch_taken(&result, "CheckAccuracy", Branch::Else);
    assert_step_status(&result, "Notify", ExecutionStatus::Succeeded);
    assert_step_not_entered(&result, "RegisterModel");

    let notify = result.call("Notify").unwrap();
    assert_eq!(notify.inputs["report"]["metrics"]["accuracy"]["value"], json!(0.42));
}

/// `>=` is inclusive at the threshold
#[tokio::test]
async fn test_threshold_is_inclusive() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let result = run_pipeline_with_runner(&pipeline, runner_with_accuracy(0.9)).await;

    assert_branch_taken(&result, "CheckAccuracy", Branch::Then);
}

/// The report may arrive as a serialized JSON string
#[tokio::test]
async fn test_json_path_reads_serialized_report() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);
    let runner = StaticRunner::new().with_output(
        "Evaluate",
        "report",
        json!(r#"{"metrics": {"accuracy": {"value": 0.99}}}"#),
    );

    let result = run_pipeline_with_runner(&pipeline, runner).await;

    assert_execution_succeeded(&result);
    assert_branch_taken(&result, "CheckAccuracy", Branch::Then);
}

/// Parallel scheduling still honours the condition gate
#[tokio::test]
async fn test_branching_under_parallel_strategy() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let result = run_pipeline_with_parameters(
        &pipeline,
        runner_with_accuracy(0.5),
        BTreeMap::new(),
        SchedulingStrategy::Parallel,
    )
    .await;

    assert_execution_succeeded(&result);
    assert_branch_taken(&result, "CheckAccuracy", Branch::Else);
    assert_step_not_entered(&result, "RegisterModel");
    assert_eq!(result.called_steps().last(), Some(&"Notify"));
}

/// Compound predicates: every entry of `conditions` must hold
#[tokio::test]
async fn test_compound_predicates() {
    let yaml = r#"
name: "compound"
parameters:
  - name: Environment
    type: string
    default: staging
  - name: Replicas
    type: integer
    default: 1
steps:
  - name: Gate
    kind: condition
    conditions:
      - value: { parameter: Environment }
        in: [prod, staging]
      - or:
          - op: "=="
            left: { parameter: Replicas }
            right: 3
          - not:
              op: greater_than
              left: { parameter: Replicas }
              right: 2
    then:
      - name: Deploy
        kind: data-callback
    else:
      - name: Skip
        kind: data-callback
"#;
    let pipeline = pipeline_from_yaml(yaml);

    let result = run_pipeline_with_runner(&pipeline, StaticRunner::new()).await;
    assert_branch_taken(&result, "Gate", Branch::Then);
    assert_call_order(&result, &["Deploy"]);

    let mut overrides = BTreeMap::new();
    overrides.insert("Environment".to_string(), ParameterValue::from("dev"));
    let result = run_pipeline_with_parameters(
        &pipeline,
        StaticRunner::new(),
        overrides,
        SchedulingStrategy::Sequential,
    )
    .await;
    assert_branch_taken(&result, "Gate", Branch::Else);
    assert_call_order(&result, &["Skip"]);
}

/// A condition nested in a then arm only runs when its parent arm was taken
#[tokio::test]
async fn test_nested_condition() {
    let yaml = r#"
name: "nested"
parameters:
  - name: Score
    type: float
    default: 0.8
steps:
  - name: Outer
    kind: condition
    conditions:
      - { op: ">", left: { parameter: Score }, right: 0.5 }
    then:
      - name: Inner
        kind: condition
        conditions:
          - { op: ">", left: { parameter: Score }, right: 0.9 }
        then:
          - name: Excellent
            kind: data-callback
        else:
          - name: Good
            kind: data-callback
    else:
      - name: Poor
        kind: data-callback
"#;
    let pipeline = pipeline_from_yaml(yaml);

    let result = run_pipeline_with_runner(&pipeline, StaticRunner::new()).await;

    assert_execution_succeeded(&result);
    assert_branch_taken(&result, "Outer", Branch::Then);
    assert_branch_taken(&result, "Inner", Branch::Else);
    assert_call_order(&result, &["Good"]);
    assert_step_not_entered(&result, "Excellent");
    assert_step_not_entered(&result, "Poor");
}

/// Condition outcomes are announced to event handlers
#[tokio::test]
async fn test_condition_event_emitted() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let result = run_pipeline_with_runner(&pipeline, runner_with_accuracy(0.1)).await;

    let branches: Vec<Branch> = result
        .events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::ConditionEvaluated { step, branch } if step == "CheckAccuracy" => Some(*branch),
            _ => None,
        })
        .collect();
    assert_eq!(branches, vec![Branch::Else]);
    assert!(matches!(
        result.events.last(),
        Some(ExecutionEvent::ExecutionFinished {
            status: ExecutionStatus::Succeeded,
            ..
        })
    ));
}
