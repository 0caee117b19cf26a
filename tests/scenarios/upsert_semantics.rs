//! Test: Upsert Semantics - create once, then replace in place

use super::MODEL_PIPELINE;
use crate::helpers::*;
use ml_pipeline::core::config::PipelineConfig;
use ml_pipeline::execution::StaticRunner;
use ml_pipeline::service::{PipelineService, ServiceError};

/// Re-upserting keeps the pipeline id and bumps the version
#[tokio::test]
async fn test_upsert_creates_then_updates() {
    let service = local_service(StaticRunner::new());
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);

    let first = service.upsert(&ctx(), &pipeline).await.unwrap();
    assert!(first.created);
    assert_eq!(first.version, 1);

    let second = service.upsert(&ctx(), &pipeline).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.version, 2);
    assert_eq!(second.pipeline_id, first.pipeline_id);

    assert_eq!(service.list_pipelines(&ctx()).await.unwrap(), vec!["scenario-pipeline"]);
}

/// The stored definition is replaced, not merged
#[tokio::test]
async fn test_upsert_replaces_definition() {
    let service = local_service(StaticRunner::new());
    service
        .upsert(&ctx(), &pipeline_from_yaml(MODEL_PIPELINE))
        .await
        .unwrap();

    let mut config = PipelineConfig::from_yaml(MODEL_PIPELINE).unwrap();
    config.steps.truncate(1);
    let trimmed = config.to_pipeline().unwrap();
    service.upsert(&ctx(), &trimmed).await.unwrap();

    let stored = service.get_pipeline(&ctx(), "scenario-pipeline").await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.pipeline.step_count(), 1);
    assert_eq!(stored.definition.steps.len(), 1);
    assert_eq!(stored.definition.steps[0]["Name"], "Preprocess");
}

/// Executions remember the version they were started from
#[tokio::test]
async fn test_execution_pins_pipeline_version() {
    let service = local_service(runner_with_accuracy(0.97));
    let pipeline = pipeline_from_yaml(MODEL_PIPELINE);
    service.upsert(&ctx(), &pipeline).await.unwrap();
    service.upsert(&ctx(), &pipeline).await.unwrap();

    let started = service
        .start(&ctx(), "scenario-pipeline", &Default::default())
        .await
        .unwrap();
    let record = ml_pipeline::service::wait_for(
        &service,
        &ctx(),
        started.execution_id,
        service.config().poll_interval(),
    )
    .await
    .unwrap();

    assert_eq!(record.pipeline_version, 2);
    let summaries = service.list_executions(&ctx(), "scenario-pipeline").await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].pipeline_version, 2);
}

#[tokio::test]
async fn test_get_unknown_pipeline() {
    let service = local_service(StaticRunner::new());

    let err = service.get_pipeline(&ctx(), "nope").await.unwrap_err();

    assert!(matches!(err, ServiceError::PipelineNotFound(name) if name == "nope"));
}
