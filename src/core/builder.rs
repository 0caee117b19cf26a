//! Pipeline descriptor builder

use crate::core::{
    parameter::Parameter,
    pipeline::Pipeline,
    step::Step,
    validation::{validate_pipeline, ValidationError},
};
use thiserror::Error;
use tracing::debug;

/// Error returned when a pipeline cannot be built
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("pipeline '{name}' is invalid: {}", join_errors(.errors))]
    Validation {
        name: String,
        errors: Vec<ValidationError>,
    },
}

impl PipelineError {
    /// The individual validation failures
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            PipelineError::Validation { errors, .. } => errors,
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Assembles parameters and steps into a validated [`Pipeline`]
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    name: String,
    parameters: Vec<Parameter>,
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Add a top-level step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Validate the graph and produce the pipeline
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        validate_pipeline(&self.name, &self.parameters, &self.steps).map_err(|errors| {
            debug!("Pipeline {} failed validation with {} error(s)", self.name, errors.len());
            PipelineError::Validation {
                name: self.name.clone(),
                errors,
            }
        })?;

        Ok(Pipeline::from_validated(self.name, self.parameters, self.steps))
    }
}
