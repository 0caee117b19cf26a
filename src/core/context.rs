//! Execution context - parameter values and step outputs seen by the emulator

use crate::core::{
    condition::ConditionError,
    parameter::ParameterValue,
    step::{PropertyRef, StepInput},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Values available to a step when its inputs are resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Effective parameter values for this execution
    pub parameters: BTreeMap<String, ParameterValue>,

    /// Outputs of succeeded steps (step name -> output name -> value)
    pub step_outputs: HashMap<String, BTreeMap<String, Value>>,
}

impl ExecutionContext {
    pub fn new(parameters: BTreeMap<String, ParameterValue>) -> Self {
        Self {
            parameters,
            step_outputs: HashMap::new(),
        }
    }

    /// Record the outputs of a succeeded step
    pub fn set_step_outputs(&mut self, step: &str, outputs: BTreeMap<String, Value>) {
        self.step_outputs.insert(step.to_string(), outputs);
    }

    /// Resolve an input to a concrete value
    pub fn resolve(&self, input: &StepInput) -> Result<Value, ConditionError> {
        match input {
            StepInput::Literal(value) => Ok(value.clone()),
            StepInput::Parameter(name) => self
                .parameters
                .get(name)
                .map(ParameterValue::to_json)
                .ok_or_else(|| ConditionError::Unresolved(format!("Parameters.{}", name))),
            StepInput::Reference(reference) => self.resolve_reference(reference),
        }
    }

    fn resolve_reference(&self, reference: &PropertyRef) -> Result<Value, ConditionError> {
        let value = self
            .step_outputs
            .get(&reference.step)
            .and_then(|outputs| outputs.get(&reference.output))
            .ok_or_else(|| ConditionError::Unresolved(reference.to_string()))?;

        match &reference.json_path {
            None => Ok(value.clone()),
            Some(path) => {
                // String outputs may hold a serialized report
                let document = match value {
                    Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
                    other => other.clone(),
                };
                json_get(&document, path)
                    .cloned()
                    .ok_or_else(|| ConditionError::Unresolved(reference.to_string()))
            }
        }
    }

    /// Resolve every input of a step
    pub fn resolve_all(
        &self,
        inputs: &BTreeMap<String, StepInput>,
    ) -> Result<BTreeMap<String, Value>, ConditionError> {
        inputs
            .iter()
            .map(|(name, input)| self.resolve(input).map(|v| (name.clone(), v)))
            .collect()
    }
}

/// Walk a dotted path (`a.b.0.c`) into a JSON document
pub fn json_get<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}
