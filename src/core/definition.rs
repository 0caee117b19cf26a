//! Pipeline definition document submitted to the pipeline service
//!
//! Parameters and property references are rendered as `Get` expressions that the
//! service resolves at execution time; nothing is resolved here.

use crate::core::{
    condition::Condition,
    parameter::Parameter,
    pipeline::Pipeline,
    step::{Payload, Step, StepInput},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Definition format version
pub const DEFINITION_VERSION: &str = "2020-12-01";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineDefinition {
    pub version: String,
    pub parameters: Vec<ParameterDefinition>,
    pub steps: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl PipelineDefinition {
    pub fn render(pipeline: &Pipeline) -> Self {
        Self {
            version: DEFINITION_VERSION.to_string(),
            parameters: pipeline.parameters().iter().map(render_parameter).collect(),
            steps: pipeline.steps().iter().map(render_step).collect(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn render_parameter(parameter: &Parameter) -> ParameterDefinition {
    ParameterDefinition {
        name: parameter.name.clone(),
        kind: parameter.kind.definition_name().to_string(),
        default_value: parameter.default.to_json(),
        enum_values: parameter
            .allowed_values
            .as_ref()
            .map(|values| values.iter().map(|v| v.to_json()).collect()),
    }
}

/// Render an input as a literal or a `Get` expression
pub fn render_input(input: &StepInput) -> Value {
    match input {
        StepInput::Literal(value) => value.clone(),
        StepInput::Parameter(name) => json!({ "Get": format!("Parameters.{}", name) }),
        StepInput::Reference(reference) => {
            let get = format!("Steps.{}.{}", reference.step, reference.output);
            match &reference.json_path {
                Some(path) => json!({ "Std:JsonGet": { "Get": get, "Path": path } }),
                None => json!({ "Get": get }),
            }
        }
    }
}

fn render_condition(condition: &Condition) -> Value {
    match condition {
        Condition::Compare { op, left, right } => json!({
            "Type": op.definition_name(),
            "LeftValue": render_input(left),
            "RightValue": render_input(right),
        }),
        Condition::In { value, candidates } => json!({
            "Type": "In",
            "QueryValue": render_input(value),
            "Values": candidates.iter().map(render_input).collect::<Vec<_>>(),
        }),
        Condition::Or(conditions) => json!({
            "Type": "Or",
            "Conditions": conditions.iter().map(render_condition).collect::<Vec<_>>(),
        }),
        Condition::Not(inner) => json!({
            "Type": "Not",
            "Expression": render_condition(inner),
        }),
    }
}

fn render_payload(payload: &Payload) -> Value {
    match payload {
        Payload::Script { path, image } => {
            let mut map = Map::new();
            map.insert("Code".to_string(), json!(path));
            if let Some(image) = image {
                map.insert("ImageUri".to_string(), json!(image));
            }
            Value::Object(map)
        }
        Payload::Image { uri } => json!({ "ImageUri": uri }),
    }
}

fn render_step(step: &Step) -> Value {
    let mut map = Map::new();
    map.insert("Name".to_string(), json!(step.name));
    map.insert("Type".to_string(), json!(step.kind.definition_name()));
    if let Some(description) = &step.description {
        map.insert("Description".to_string(), json!(description));
    }
    if !step.depends_on.is_empty() {
        map.insert("DependsOn".to_string(), json!(step.depends_on));
    }

    let arguments = match &step.condition {
        Some(node) => json!({
            "Conditions": node.conditions.iter().map(render_condition).collect::<Vec<_>>(),
            "IfSteps": node.then_steps.iter().map(render_step).collect::<Vec<_>>(),
            "ElseSteps": node.else_steps.iter().map(render_step).collect::<Vec<_>>(),
        }),
        None => {
            let inputs: Map<String, Value> = step
                .inputs
                .iter()
                .map(|(name, input)| (name.clone(), render_input(input)))
                .collect();
            let mut args = Map::new();
            args.insert("Inputs".to_string(), Value::Object(inputs));
            args.insert("Outputs".to_string(), json!(step.outputs));
            if let Some(payload) = &step.payload {
                args.insert("AppSpecification".to_string(), render_payload(payload));
            }
            Value::Object(args)
        }
    };
    map.insert("Arguments".to_string(), arguments);

    Value::Object(map)
}
