//! Test: Validation Failures - malformed graphs never become pipelines

use ml_pipeline::core::config::PipelineConfig;
use ml_pipeline::core::{ParameterError, ValidationError};

fn validation_errors(yaml: &str) -> Vec<ValidationError> {
    let config = PipelineConfig::from_yaml(yaml).expect("YAML should parse");
    match config.to_pipeline() {
        Ok(_) => panic!("pipeline should have been rejected"),
        Err(e) => e.errors().to_vec(),
    }
}

/// A then-arm step is invisible to steps after the condition
#[test]
fn test_reference_into_branch_is_rejected() {
    let yaml = r#"
name: "leaky-branch"
steps:
  - name: Evaluate
    kind: process
    payload: { script: evaluate.py }
    outputs: [report]
  - name: Check
    kind: condition
    conditions:
      - { op: ">", left: { step: Evaluate, output: report, json_path: accuracy }, right: 0.5 }
    then:
      - name: CreateModel
        kind: create-model
        inputs:
          model_data: s3://bucket/model.tar.gz
        outputs: [model_name]
  - name: Deploy
    kind: data-callback
    inputs:
      model: { step: CreateModel, output: model_name }
"#;
    let errors = validation_errors(yaml);

    assert!(
        errors.iter().any(|e| matches!(
            e,
            ValidationError::BranchScope { step, target, .. } if step == "Deploy" && target == "CreateModel"
        )),
        "got {:?}",
        errors
    );
}

/// Sibling arms cannot see each other either
#[test]
fn test_reference_across_arms_is_rejected() {
    let yaml = r#"
name: "cross-arm"
steps:
  - name: Check
    kind: condition
    conditions:
      - { op: "==", left: 1, right: 1 }
    then:
      - name: Left
        kind: process
        payload: { script: left.py }
        outputs: [result]
    else:
      - name: Right
        kind: data-callback
        inputs:
          result: { step: Left, output: result }
"#;
    let errors = validation_errors(yaml);

    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::BranchScope { step, .. } if step == "Right")));
}

#[test]
fn test_dependency_cycle_is_rejected() {
    let yaml = r#"
name: "cycle"
steps:
  - name: A
    kind: process
    payload: { script: a.py }
    inputs:
      upstream: { step: B, output: out }
    outputs: [out]
  - name: B
    kind: process
    payload: { script: b.py }
    depends_on: [A]
    outputs: [out]
"#;
    let errors = validation_errors(yaml);

    assert_eq!(errors.len(), 1, "got {:?}", errors);
    match &errors[0] {
        ValidationError::CyclicDependency { cycle } => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"A".to_string()));
            assert!(cycle.contains(&"B".to_string()));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

/// Every problem is reported at once
#[test]
fn test_errors_accumulate() {
    let yaml = r#"
name: "-bad-name"
parameters:
  - name: Count
    type: integer
    default: "three"
steps:
  - name: Train
    kind: train
    inputs:
      data: { step: Ghost, output: data }
      region: { parameter: Region }
    outputs: [model]
  - name: Train
    kind: register-model
    inputs:
      approval_status: Maybe
"#;
    let errors = validation_errors(yaml);

    let has = |predicate: &dyn Fn(&ValidationError) -> bool| errors.iter().any(predicate);
    assert!(has(&|e| matches!(e, ValidationError::InvalidName { .. })));
    assert!(has(&|e| matches!(e, ValidationError::InvalidParameterDefault { name, .. } if name == "Count")));
    assert!(has(&|e| matches!(e, ValidationError::DuplicateStepName { name } if name == "Train")));
    assert!(has(&|e| matches!(e, ValidationError::MissingPayload { step, .. } if step == "Train")));
    assert!(has(&|e| matches!(e, ValidationError::MissingInput { input, .. } if input == "model_data")));
    assert!(has(&|e| matches!(e, ValidationError::InvalidApprovalStatus { value, .. } if value == "Maybe")));
    assert!(has(&|e| matches!(e, ValidationError::DanglingReference { target, .. } if target == "Ghost")));
    assert!(has(&|e| matches!(e, ValidationError::UnknownParameter { parameter, .. } if parameter == "Region")));
}

#[test]
fn test_unknown_output_is_rejected() {
    let yaml = r#"
name: "typo"
steps:
  - name: Preprocess
    kind: process
    payload: { script: pre.py }
    outputs: [train]
  - name: Train
    kind: train
    payload: { image: xgboost:1.7-1 }
    inputs:
      train: { step: Preprocess, output: trian }
"#;
    let errors = validation_errors(yaml);

    assert_eq!(
        errors,
        vec![ValidationError::UnknownOutput {
            step: "Train".to_string(),
            target: "Preprocess".to_string(),
            output: "trian".to_string(),
        }]
    );
}

#[test]
fn test_condition_without_predicates_is_rejected() {
    let yaml = r#"
name: "empty-gate"
steps:
  - name: Gate
    kind: condition
    then:
      - name: Notify
        kind: data-callback
"#;
    let errors = validation_errors(yaml);

    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::EmptyCondition { step } if step == "Gate")));
}

#[test]
fn test_non_finite_default_is_rejected() {
    let yaml = r#"
name: "nan-default"
parameters:
  - name: Threshold
    type: float
    default: .nan
steps:
  - name: Notify
    kind: data-callback
"#;
    let errors = validation_errors(yaml);

    assert!(
        errors.iter().any(|e| matches!(
            e,
            ValidationError::InvalidParameterDefault { name, reason: ParameterError::NonFinite { .. } }
                if name == "Threshold"
        )),
        "got {:?}",
        errors
    );
}
