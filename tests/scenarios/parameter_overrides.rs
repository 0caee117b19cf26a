//! Test: Parameter Overrides - defaults, typed overrides and allowed values

use super::MODEL_PIPELINE;
use crate::helpers::*;
use ml_pipeline::core::{Branch, ParameterError, ParameterValue};
use ml_pipeline::execution::SchedulingStrategy;
use serde_json::json;
use std::collections::BTreeMap;

/// Overrides flow into step inputs and condition operands
#[tokio::test]
async fn test_overrides_reach_steps_and_conditions() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);
    let overrides = pipeline
        .parse_overrides(&[
            ("InstanceCount".to_string(), "4".to_string()),
            ("AccuracyThreshold".to_string(), "0.99".to_string()),
            ("ApprovalStatus".to_string(), "Approved".to_string()),
        ])
        .unwrap();

    let result = run_pipeline_with_parameters(
        &pipeline,
        runner_with_accuracy(0.95),
        overrides,
        SchedulingStrategy::Sequential,
    )
    .await;

    assert_execution_succeeded(&result);
    assert_eq!(result.record.parameters["InstanceCount"], ParameterValue::Integer(4));
    assert_eq!(result.call("Preprocess").unwrap().inputs["instance_count"], json!(4));
    // 0.95 no longer clears the raised threshold
    assert_branch_taken(&result, "CheckAccuracy", Branch::Else);
}

/// Unset parameters fall back to their defaults and are recorded on the execution
#[tokio::test]
async fn test_defaults_are_recorded() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let result = run_pipeline_with_runner(&pipeline, runner_with_accuracy(0.95)).await;

    let parameters = &result.record.parameters;
    assert_eq!(parameters.len(), 3);
    assert_eq!(parameters["InstanceCount"], ParameterValue::Integer(1));
    assert_eq!(parameters["AccuracyThreshold"], ParameterValue::Float(0.9));
    assert_eq!(
        parameters["ApprovalStatus"],
        ParameterValue::String("PendingManualApproval".to_string())
    );
}

#[test]
fn test_unparseable_override_is_rejected() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let errors = pipeline
        .parse_overrides(&[("InstanceCount".to_string(), "four".to_string())])
        .unwrap_err();

    assert!(matches!(&errors[..], [ParameterError::Unparseable { name, .. }] if name == "InstanceCount"));
}

#[test]
fn test_unknown_and_disallowed_overrides_are_all_reported() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let mut overrides = BTreeMap::new();
    overrides.insert("Region".to_string(), ParameterValue::from("eu-west-1"));
    overrides.insert("ApprovalStatus".to_string(), ParameterValue::from("Maybe"));
    let errors = pipeline.resolve_parameters(&overrides).unwrap_err();

    assert_eq!(errors.len(), 2, "got {:?}", errors);
    assert!(errors
        .iter()
        .any(|e| matches!(e, ParameterError::Unknown { name } if name == "Region")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ParameterError::NotAllowed { value, .. } if value == "Maybe")));
}

#[test]
fn test_override_type_mismatch() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let mut overrides = BTreeMap::new();
    overrides.insert("InstanceCount".to_string(), ParameterValue::from("many"));
    let errors = pipeline.resolve_parameters(&overrides).unwrap_err();

    assert!(matches!(&errors[..], [ParameterError::TypeMismatch { name, .. }] if name == "InstanceCount"));
}

/// NaN and infinity have no JSON form, so they never reach an execution record
#[test]
fn test_non_finite_override_is_rejected() {
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let errors = pipeline
        .parse_overrides(&[
            ("AccuracyThreshold".to_string(), "NaN".to_string()),
            ("InstanceCount".to_string(), "2".to_string()),
        ])
        .unwrap_err();

    assert!(matches!(&errors[..], [ParameterError::NonFinite { name, .. }] if name == "AccuracyThreshold"));

    let mut overrides = BTreeMap::new();
    overrides.insert("AccuracyThreshold".to_string(), ParameterValue::Float(f64::INFINITY));
    let errors = pipeline.resolve_parameters(&overrides).unwrap_err();
    assert!(matches!(&errors[..], [ParameterError::NonFinite { .. }]));
}
