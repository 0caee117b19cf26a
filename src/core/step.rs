//! Step domain model

use crate::core::condition::{Branch, ConditionNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of work a step describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Hand-off to an external callback (e.g. a queue consumer)
    DataCallback,
    /// Training job
    Train,
    /// Processing job (preprocessing, evaluation)
    Process,
    /// Model object creation from trained artifacts
    CreateModel,
    /// Model package registration
    RegisterModel,
    /// Conditional branch node
    Condition,
}

impl StepKind {
    /// Type name used in the submitted pipeline definition
    pub fn definition_name(&self) -> &'static str {
        match self {
            StepKind::DataCallback => "Callback",
            StepKind::Train => "Training",
            StepKind::Process => "Processing",
            StepKind::CreateModel => "Model",
            StepKind::RegisterModel => "RegisterModel",
            StepKind::Condition => "Condition",
        }
    }

    /// Whether the kind needs an executable payload
    pub fn requires_payload(&self) -> bool {
        matches!(self, StepKind::Train | StepKind::Process)
    }

    /// Inputs the kind cannot run without
    pub fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            StepKind::CreateModel => &["model_data"],
            StepKind::RegisterModel => &["model_data", "approval_status"],
            _ => &[],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::DataCallback => "data-callback",
            StepKind::Train => "train",
            StepKind::Process => "process",
            StepKind::CreateModel => "create-model",
            StepKind::RegisterModel => "register-model",
            StepKind::Condition => "condition",
        };
        write!(f, "{}", name)
    }
}

/// Forward pointer to another step's declared output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyRef {
    pub step: String,
    pub output: String,

    /// Optional path into the output document (e.g. `metrics.accuracy.value`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
}

impl PropertyRef {
    pub fn new(step: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            output: output.into(),
            json_path: None,
        }
    }

    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = Some(path.into());
        self
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Steps.{}.{}", self.step, self.output)?;
        if let Some(path) = &self.json_path {
            write!(f, "[{}]", path)?;
        }
        Ok(())
    }
}

/// Value bound to a step input (or a condition operand)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepInput {
    /// Literal known at build time
    Literal(serde_json::Value),
    /// Pipeline parameter, substituted per execution
    Parameter(String),
    /// Another step's output, resolved at execution time
    Reference(PropertyRef),
}

impl StepInput {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        StepInput::Literal(value.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        StepInput::Parameter(name.into())
    }

    pub fn reference(step: impl Into<String>, output: impl Into<String>) -> Self {
        StepInput::Reference(PropertyRef::new(step, output))
    }

    pub fn json_get(step: impl Into<String>, output: impl Into<String>, path: impl Into<String>) -> Self {
        StepInput::Reference(PropertyRef::new(step, output).with_json_path(path))
    }

    pub fn as_reference(&self) -> Option<&PropertyRef> {
        match self {
            StepInput::Reference(r) => Some(r),
            _ => None,
        }
    }
}

/// Opaque executable payload run by the external service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Script executed inside a framework container
    Script {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    /// Container image with its own entry point
    Image { uri: String },
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, unique across the whole pipeline
    pub name: String,

    pub kind: StepKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Named inputs
    #[serde(default)]
    pub inputs: BTreeMap<String, StepInput>,

    /// Declared output names
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    /// Explicit ordering dependencies with no data edge
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Predicate and branches; present only for condition steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionNode>,
}

impl Step {
    /// Create a step of a non-condition kind
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            inputs: BTreeMap::new(),
            outputs: Vec::new(),
            payload: None,
            depends_on: Vec::new(),
            condition: None,
        }
    }

    pub fn process(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::Process)
    }

    pub fn train(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::Train)
    }

    pub fn create_model(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::CreateModel)
    }

    pub fn register_model(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::RegisterModel)
    }

    pub fn data_callback(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::DataCallback)
    }

    /// Create a condition step
    pub fn condition(name: impl Into<String>, node: ConditionNode) -> Self {
        let mut step = Self::new(name, StepKind::Condition);
        step.condition = Some(node);
        step
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, input: StepInput) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_script(self, path: impl Into<String>) -> Self {
        self.with_payload(Payload::Script {
            path: path.into(),
            image: None,
        })
    }

    pub fn with_image(self, uri: impl Into<String>) -> Self {
        self.with_payload(Payload::Image { uri: uri.into() })
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    /// Whether the step declares the named output
    pub fn has_output(&self, output: &str) -> bool {
        self.outputs.iter().any(|o| o == output)
    }

    /// Every operand the step reads: its inputs, plus predicate operands for condition steps
    pub fn operands(&self) -> Vec<&StepInput> {
        let mut operands: Vec<&StepInput> = self.inputs.values().collect();
        if let Some(node) = &self.condition {
            for condition in &node.conditions {
                operands.extend(condition.operands());
            }
        }
        operands
    }

    /// Property references the step reads
    pub fn references(&self) -> Vec<&PropertyRef> {
        self.operands().into_iter().filter_map(StepInput::as_reference).collect()
    }

    /// Parameter names the step reads
    pub fn parameter_refs(&self) -> Vec<&str> {
        self.operands()
            .into_iter()
            .filter_map(|op| match op {
                StepInput::Parameter(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// One arm of one condition node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchKey {
    pub condition: String,
    pub branch: Branch,
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.condition, self.branch)
    }
}

/// A step together with the chain of branches that own it
#[derive(Debug, Clone)]
pub struct ScopedStep<'a> {
    pub step: &'a Step,
    /// Enclosing branches, outermost first. Empty for top-level steps.
    pub scope: Vec<BranchKey>,
}

impl<'a> ScopedStep<'a> {
    /// Whether a step in `other` scope is visible from this step
    pub fn can_see(&self, other: &[BranchKey]) -> bool {
        other.len() <= self.scope.len() && self.scope[..other.len()] == *other
    }

    /// The condition node that owns this step, if any
    pub fn parent_condition(&self) -> Option<&str> {
        self.scope.last().map(|key| key.condition.as_str())
    }

    /// Names of every step this one must wait for
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps: BTreeSet<String> = self.step.depends_on.iter().cloned().collect();
        deps.extend(self.step.references().into_iter().map(|r| r.step.clone()));
        if let Some(parent) = self.parent_condition() {
            deps.insert(parent.to_string());
        }
        deps
    }
}

/// Flatten top-level steps and every branch step, depth first
pub fn flatten(steps: &[Step]) -> Vec<ScopedStep<'_>> {
    let mut out = Vec::new();
    flatten_into(steps, &[], &mut out);
    out
}

fn flatten_into<'a>(steps: &'a [Step], scope: &[BranchKey], out: &mut Vec<ScopedStep<'a>>) {
    for step in steps {
        out.push(ScopedStep {
            step,
            scope: scope.to_vec(),
        });
        if let Some(node) = &step.condition {
            for (branch, children) in [(Branch::Then, &node.then_steps), (Branch::Else, &node.else_steps)] {
                let mut child_scope = scope.to_vec();
                child_scope.push(BranchKey {
                    condition: step.name.clone(),
                    branch,
                });
                flatten_into(children, &child_scope, out);
            }
        }
    }
}
