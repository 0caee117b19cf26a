//! Test: Service Lifecycle - start, describe, stop, delete and teardown

use super::MODEL_PIPELINE;
use crate::helpers::*;
use ml_pipeline::core::{Branch, ExecutionStatus, ParameterValue};
use ml_pipeline::execution::StaticRunner;
use ml_pipeline::service::{
    teardown, wait_for, Credential, EndpointSpec, PipelineService, ServiceError, SessionContext, TeardownRequest,
};
use std::collections::BTreeMap;
use std::time::Duration;

#[tokio::test]
async fn test_started_execution_runs_to_completion() {
    let service = local_service(runner_with_accuracy(0.97));
    service
        .upsert(&ctx(), &pipeline_from_yaml(MODEL_PIPELINE))
        .await
        .unwrap();

    let started = service
        .start(&ctx(), "scenario-pipeline", &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(started.status, ExecutionStatus::Executing);

    let record = wait_for(&service, &ctx(), started.execution_id, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Succeeded);
    assert_eq!(record.pipeline_version, 1);
    assert_eq!(
        record.step("CheckAccuracy").and_then(|s| s.outcome),
        Some(Branch::Then)
    );
    assert_eq!(
        record.entered_steps(),
        vec!["Preprocess", "Train", "Evaluate", "CheckAccuracy", "RegisterModel"]
    );
}

/// Bad overrides are rejected before anything is recorded
#[tokio::test]
async fn test_start_with_invalid_parameters() {
    let service = local_service(StaticRunner::new());
    service
        .upsert(&ctx(), &pipeline_from_yaml(MODEL_PIPELINE))
        .await
        .unwrap();

    let mut overrides = BTreeMap::new();
    overrides.insert("ApprovalStatus".to_string(), ParameterValue::from("Shipped"));
    let err = service
        .start(&ctx(), "scenario-pipeline", &overrides)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidParameters(ref errors) if errors.len() == 1));
    assert!(service
        .list_executions(&ctx(), "scenario-pipeline")
        .await
        .unwrap()
        .is_empty());
}

/// Every call is refused without credentials
#[tokio::test]
async fn test_calls_require_credentials() {
    let service = local_service(StaticRunner::new());
    let anonymous = SessionContext::new("us-east-1", Credential::default());

    assert!(matches!(
        service.list_pipelines(&anonymous).await,
        Err(ServiceError::Unauthorized(_))
    ));
    assert!(matches!(
        service.start(&anonymous, "scenario-pipeline", &BTreeMap::new()).await,
        Err(ServiceError::Unauthorized(_))
    ));
    assert!(matches!(
        service.delete_endpoint(&anonymous, "anything").await,
        Err(ServiceError::Unauthorized(_))
    ));
}

/// Stopping cancels in-flight steps and ends the execution Stopped
#[tokio::test]
async fn test_stop_cancels_running_steps() {
    let service = local_service(runner_with_accuracy(0.97).with_delay(Duration::from_secs(30)));
    service
        .upsert(&ctx(), &pipeline_from_yaml(MODEL_PIPELINE))
        .await
        .unwrap();

    let started = service
        .start(&ctx(), "scenario-pipeline", &BTreeMap::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    service.stop(&ctx(), started.execution_id).await.unwrap();

    let record = wait_for(&service, &ctx(), started.execution_id, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Stopped);
    assert!(record.failure_reason.is_none());
    assert_eq!(
        record.step("Preprocess").map(|s| s.status),
        Some(ExecutionStatus::Stopped)
    );
    assert!(record.step("Train").is_none());

    let err = service.stop(&ctx(), started.execution_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExecutionFinished(_)));
}

#[tokio::test]
async fn test_describe_unknown_execution() {
    let service = local_service(StaticRunner::new());

    let err = service.describe(&ctx(), uuid::Uuid::new_v4()).await.unwrap_err();

    assert!(matches!(err, ServiceError::ExecutionNotFound(_)));
}

/// Deleting a pipeline removes its executions, including one still running
#[tokio::test]
async fn test_delete_pipeline_cascades() {
    let service = local_service(StaticRunner::new().with_delay(Duration::from_secs(30)));
    service
        .upsert(&ctx(), &pipeline_from_yaml(MODEL_PIPELINE))
        .await
        .unwrap();
    let started = service
        .start(&ctx(), "scenario-pipeline", &BTreeMap::new())
        .await
        .unwrap();

    assert!(service.delete_pipeline(&ctx(), "scenario-pipeline").await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        service.describe(&ctx(), started.execution_id).await,
        Err(ServiceError::ExecutionNotFound(_))
    ));
    assert!(service
        .list_executions(&ctx(), "scenario-pipeline")
        .await
        .unwrap()
        .is_empty());
    assert!(!service.delete_pipeline(&ctx(), "scenario-pipeline").await.unwrap());
}

#[tokio::test]
async fn test_teardown_removes_pipeline_and_endpoints() {
    let service = local_service(StaticRunner::new());
    service
        .upsert(&ctx(), &pipeline_from_yaml(MODEL_PIPELINE))
        .await
        .unwrap();
    for name in ["abalone-staging", "abalone-prod"] {
        service
            .create_endpoint(
                &ctx(),
                &EndpointSpec {
                    name: name.to_string(),
                    model_name: "abalone-model".to_string(),
                },
            )
            .await
            .unwrap();
    }

    let request = TeardownRequest {
        pipeline_name: Some("scenario-pipeline".to_string()),
        endpoints: vec!["abalone-staging".to_string(), "abalone-prod".to_string()],
    };
    let report = teardown(&service, &ctx(), &request).await.unwrap();

    assert!(report.pipeline_deleted);
    assert_eq!(report.endpoints_deleted, vec!["abalone-staging", "abalone-prod"]);
    assert!(report.endpoints_missing.is_empty());

    // A second teardown finds nothing left
    let report = teardown(&service, &ctx(), &request).await.unwrap();
    assert!(!report.pipeline_deleted);
    assert!(report.endpoints_deleted.is_empty());
    assert_eq!(report.endpoints_missing.len(), 2);
}

#[tokio::test]
async fn test_endpoint_requires_names() {
    let service = local_service(StaticRunner::new());

    let err = service
        .create_endpoint(
            &ctx(),
            &EndpointSpec {
                name: String::new(),
                model_name: "abalone-model".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}
