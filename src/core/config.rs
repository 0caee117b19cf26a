//! Pipeline configuration from YAML

use crate::core::{
    builder::{PipelineBuilder, PipelineError},
    condition::{Comparison, Condition, ConditionNode},
    parameter::{Parameter, ParameterType, ParameterValue},
    pipeline::Pipeline,
    step::{Payload, PropertyRef, Step, StepInput, StepKind},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Execution parameters
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,

    /// Top-level steps
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Parameter definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ParameterType,

    pub default: ParameterValue,

    #[serde(default)]
    pub allowed_values: Option<Vec<ParameterValue>>,
}

/// Step input: a parameter, a property reference or a literal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputConfig {
    /// `{ literal: ... }` forces a literal even if it looks like a reference
    Literal { literal: serde_json::Value },
    Parameter { parameter: String },
    Reference {
        step: String,
        output: String,
        #[serde(default)]
        json_path: Option<String>,
    },
    Value(serde_json::Value),
}

/// Executable payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadConfig {
    Script {
        script: String,
        #[serde(default)]
        image: Option<String>,
    },
    Image { image: String },
}

/// Condition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionConfig {
    Compare {
        op: Comparison,
        left: InputConfig,
        right: InputConfig,
    },
    In {
        value: InputConfig,
        #[serde(rename = "in")]
        candidates: Vec<InputConfig>,
    },
    Or { or: Vec<ConditionConfig> },
    Not { not: Box<ConditionConfig> },
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step name
    pub name: String,

    pub kind: StepKind,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputConfig>,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub payload: Option<PayloadConfig>,

    /// List of step names this step depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Predicate (condition steps only)
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,

    /// Steps run when the predicate holds
    #[serde(default, rename = "then", alias = "if_steps")]
    pub then_steps: Vec<StepConfig>,

    /// Steps run when it does not
    #[serde(default, rename = "else", alias = "else_steps")]
    pub else_steps: Vec<StepConfig>,
}

impl From<&ParameterConfig> for Parameter {
    fn from(config: &ParameterConfig) -> Self {
        Parameter {
            name: config.name.clone(),
            kind: config.kind,
            default: config.default.clone(),
            allowed_values: config.allowed_values.clone(),
        }
    }
}

impl From<&InputConfig> for StepInput {
    fn from(config: &InputConfig) -> Self {
        match config {
            InputConfig::Literal { literal } => StepInput::Literal(literal.clone()),
            InputConfig::Parameter { parameter } => StepInput::Parameter(parameter.clone()),
            InputConfig::Reference {
                step,
                output,
                json_path,
            } => StepInput::Reference(PropertyRef {
                step: step.clone(),
                output: output.clone(),
                json_path: json_path.clone(),
            }),
            InputConfig::Value(value) => StepInput::Literal(value.clone()),
        }
    }
}

impl From<&PayloadConfig> for Payload {
    fn from(config: &PayloadConfig) -> Self {
        match config {
            PayloadConfig::Script { script, image } => Payload::Script {
                path: script.clone(),
                image: image.clone(),
            },
            PayloadConfig::Image { image } => Payload::Image { uri: image.clone() },
        }
    }
}

impl From<&ConditionConfig> for Condition {
    fn from(config: &ConditionConfig) -> Self {
        match config {
            ConditionConfig::Compare { op, left, right } => {
                Condition::compare(*op, left.into(), right.into())
            }
            ConditionConfig::In { value, candidates } => {
                Condition::is_in(value.into(), candidates.iter().map(Into::into).collect())
            }
            ConditionConfig::Or { or } => Condition::or(or.iter().map(Into::into).collect()),
            ConditionConfig::Not { not } => Condition::negate(not.as_ref().into()),
        }
    }
}

impl StepConfig {
    /// Convert to the domain step, branches included
    pub fn to_step(&self) -> Step {
        let has_predicate = self.kind == StepKind::Condition
            || !self.conditions.is_empty()
            || !self.then_steps.is_empty()
            || !self.else_steps.is_empty();

        let condition = has_predicate.then(|| ConditionNode {
            conditions: self.conditions.iter().map(Into::into).collect(),
            then_steps: self.then_steps.iter().map(StepConfig::to_step).collect(),
            else_steps: self.else_steps.iter().map(StepConfig::to_step).collect(),
        });

        Step {
            name: self.name.clone(),
            kind: self.kind,
            description: self.description.clone(),
            inputs: self
                .inputs
                .iter()
                .map(|(name, input)| (name.clone(), input.into()))
                .collect(),
            outputs: self.outputs.clone(),
            payload: self.payload.as_ref().map(Into::into),
            depends_on: self.depends_on.clone(),
            condition,
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml).context("Invalid pipeline YAML")?;
        Ok(config)
    }

    /// Build and validate the pipeline
    pub fn to_pipeline(&self) -> Result<Pipeline, PipelineError> {
        PipelineBuilder::new(self.name.clone())
            .parameters(self.parameters.iter().map(Parameter::from))
            .steps(self.steps.iter().map(StepConfig::to_step))
            .build()
    }

    /// Total number of steps, branches included
    pub fn step_count(&self) -> usize {
        fn count(steps: &[StepConfig]) -> usize {
            steps
                .iter()
                .map(|s| 1 + count(&s.then_steps) + count(&s.else_steps))
                .sum()
        }
        count(&self.steps)
    }
}

/// Load and validate a pipeline from a YAML file
pub fn load_pipeline<P: AsRef<Path>>(path: P) -> Result<Pipeline> {
    let config = PipelineConfig::from_file(path)?;
    let pipeline = config.to_pipeline()?;
    Ok(pipeline)
}
