//! ml-pipeline - build, validate and submit declarative ML pipelines

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod service;

// Re-export commonly used types
pub use crate::core::{
    Branch, Comparison, Condition, ConditionNode, ExecutionRecord, ExecutionStatus, Parameter, ParameterValue, Pipeline,
    PipelineBuilder, PipelineError, Step, StepInput, StepKind, ValidationError,
};
pub use crate::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy, StaticRunner, StepRunner};
pub use crate::service::{Credential, LocalPipelineService, PipelineService, ServiceConfig, ServiceError, SessionContext};
