//! Scenario-based tests for ml-pipeline

mod condition_branching;
mod failure_passthrough;
mod parameter_overrides;
mod service_lifecycle;
mod upsert_semantics;
mod validation_failures;

/// Train, evaluate and branch on accuracy, shared by several scenarios
pub const MODEL_PIPELINE: &str = r#"
name: "scenario-pipeline"

parameters:
  - name: InstanceCount
    type: integer
    default: 1
  - name: ApprovalStatus
    type: string
    default: PendingManualApproval
    allowed_values: [PendingManualApproval, Approved, Rejected]
  - name: AccuracyThreshold
    type: float
    default: 0.9

steps:
  - name: Preprocess
    kind: process
    payload: { script: preprocess.py }
    inputs:
      instance_count: { parameter: InstanceCount }
    outputs: [train, test]

  - name: Train
    kind: train
    payload: { image: xgboost:1.7-1 }
    inputs:
      train: { step: Preprocess, output: train }
    outputs: [model_artifacts]

  - name: Evaluate
    kind: process
    payload: { script: evaluate.py }
    inputs:
      model: { step: Train, output: model_artifacts }
      test: { step: Preprocess, output: test }
    outputs: [report]

  - name: CheckAccuracy
    kind: condition
    conditions:
      - op: ">="
        left: { step: Evaluate, output: report, json_path: metrics.accuracy.value }
        right: { parameter: AccuracyThreshold }
    then:
      - name: RegisterModel
        kind: register-model
        inputs:
          model_data: { step: Train, output: model_artifacts }
          approval_status: { parameter: ApprovalStatus }
        outputs: [model_package_arn]
    else:
      - name: Notify
        kind: data-callback
        inputs:
          report: { step: Evaluate, output: report }
"#;
