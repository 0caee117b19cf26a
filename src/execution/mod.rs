//! Local pipeline execution engine

pub mod engine;
pub mod runner;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, SharedRecord, StopSignal};
pub use runner::{artifact_uri, ResolvedStep, StaticRunner, StepError, StepRunner};
pub use scheduler::{ExecutionPlan, ExecutionScheduler, SchedulingStrategy};
