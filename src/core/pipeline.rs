//! Pipeline domain model

use crate::core::{
    builder::{PipelineBuilder, PipelineError},
    definition::PipelineDefinition,
    parameter::{resolve_parameters, Parameter, ParameterError, ParameterValue},
    step::{flatten, ScopedStep, Step},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A validated pipeline graph.
///
/// Only [`PipelineBuilder::build`] (or deserialization, which goes through the
/// builder) produces one, so every instance satisfies the graph invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PipelineParts", into = "PipelineParts")]
pub struct Pipeline {
    name: String,
    parameters: Vec<Parameter>,
    steps: Vec<Step>,

    /// Topological order over every step, branches included (not serialized)
    execution_order: Vec<String>,
}

/// Unvalidated serialized form of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParts {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub steps: Vec<Step>,
}

impl TryFrom<PipelineParts> for Pipeline {
    type Error = PipelineError;

    fn try_from(parts: PipelineParts) -> Result<Self, Self::Error> {
        PipelineBuilder::new(parts.name)
            .parameters(parts.parameters)
            .steps(parts.steps)
            .build()
    }
}

impl From<Pipeline> for PipelineParts {
    fn from(pipeline: Pipeline) -> Self {
        PipelineParts {
            name: pipeline.name,
            parameters: pipeline.parameters,
            steps: pipeline.steps,
        }
    }
}

impl Pipeline {
    /// Assemble a pipeline whose graph has already passed validation
    pub(crate) fn from_validated(name: String, parameters: Vec<Parameter>, steps: Vec<Step>) -> Self {
        let execution_order = Self::topological_sort(&flatten(&steps));
        Pipeline {
            name,
            parameters,
            steps,
            execution_order,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Top-level steps (condition branches are owned by their condition steps)
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Find a step by name anywhere in the graph
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.scoped_steps().into_iter().find(|s| s.step.name == name).map(|s| s.step)
    }

    /// Every step with its branch scope, depth first
    pub fn scoped_steps(&self) -> Vec<ScopedStep<'_>> {
        flatten(&self.steps)
    }

    /// Total number of steps, branches included
    pub fn step_count(&self) -> usize {
        self.scoped_steps().len()
    }

    /// Execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Merge overrides over defaults, checking types and allowed values
    pub fn resolve_parameters(
        &self,
        overrides: &BTreeMap<String, ParameterValue>,
    ) -> Result<BTreeMap<String, ParameterValue>, Vec<ParameterError>> {
        resolve_parameters(&self.parameters, overrides)
    }

    /// Parse raw `name=value` overrides using each parameter's declared type
    pub fn parse_overrides(
        &self,
        raw: &[(String, String)],
    ) -> Result<BTreeMap<String, ParameterValue>, Vec<ParameterError>> {
        let mut errors = Vec::new();
        let mut overrides = BTreeMap::new();

        for (name, value) in raw {
            match self.parameter(name) {
                Some(parameter) => match parameter.parse_override(value) {
                    Ok(v) => {
                        overrides.insert(name.clone(), v);
                    }
                    Err(e) => errors.push(e),
                },
                None => errors.push(ParameterError::Unknown { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(overrides)
        } else {
            Err(errors)
        }
    }

    /// Render the document submitted to the pipeline service
    pub fn definition(&self) -> PipelineDefinition {
        PipelineDefinition::render(self)
    }

    /// Kahn's algorithm with a sorted ready set, so the order is deterministic
    fn topological_sort(flat: &[ScopedStep<'_>]) -> Vec<String> {
        let mut remaining: HashMap<String, BTreeSet<String>> = flat
            .iter()
            .map(|s| (s.step.name.clone(), s.dependencies()))
            .collect();
        let mut done = HashSet::new();
        let mut result = Vec::with_capacity(remaining.len());

        loop {
            let mut ready: Vec<String> = remaining
                .iter()
                .filter(|(_, deps)| deps.iter().all(|d| done.contains(d)))
                .map(|(name, _)| name.clone())
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort();
            for name in ready {
                remaining.remove(&name);
                done.insert(name.clone());
                result.push(name);
            }
        }

        result
    }
}
