//! Pipeline graph validation
//!
//! Checks run in a fixed order so that each stage can rely on the previous one:
//!
//! 1. names (pipeline, parameters, steps) are well-formed and unique
//! 2. parameter defaults conform to their declared types
//! 3. step kinds carry what they need (payload, required inputs, predicate)
//! 4. every parameter, property reference and `depends_on` entry resolves,
//!    and only points at steps visible from the referencing step's branch
//! 5. the dependency graph is acyclic
//!
//! Cycle detection needs a resolvable graph, so it only runs when stage 4 passes.
//! All other errors are accumulated so a caller sees every problem at once.

use crate::core::parameter::{Parameter, ParameterError};
use crate::core::step::{flatten, ScopedStep, Step, StepInput, StepKind};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Approval statuses accepted by model registration
pub const APPROVAL_STATUSES: [&str; 3] = ["PendingManualApproval", "Approved", "Rejected"];

/// What a malformed name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Pipeline,
    Parameter,
    Step,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Pipeline => write!(f, "pipeline"),
            NameKind::Parameter => write!(f, "parameter"),
            NameKind::Step => write!(f, "step"),
        }
    }
}

/// Errors found while validating a pipeline graph
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: NameKind, name: String },

    #[error("duplicate parameter name '{name}'")]
    DuplicateParameter { name: String },

    #[error("parameter '{name}' has an invalid default: {reason}")]
    InvalidParameterDefault { name: String, reason: ParameterError },

    #[error("duplicate step name '{name}'")]
    DuplicateStepName { name: String },

    #[error("step '{step}' declares output '{output}' more than once")]
    DuplicateOutput { step: String, output: String },

    #[error("{kind} step '{step}' requires a payload")]
    MissingPayload { step: String, kind: StepKind },

    #[error("{kind} step '{step}' requires input '{input}'")]
    MissingInput {
        step: String,
        kind: StepKind,
        input: String,
    },

    #[error("step '{step}' uses unknown approval status '{value}'")]
    InvalidApprovalStatus { step: String, value: String },

    #[error("step '{step}' of kind {kind} does not match its predicate")]
    ConditionMismatch { step: String, kind: StepKind },

    #[error("condition step '{step}' has no conditions")]
    EmptyCondition { step: String },

    #[error("condition step '{step}' cannot declare outputs or a payload")]
    ConditionShape { step: String },

    #[error("step '{step}' references unknown parameter '{parameter}'")]
    UnknownParameter { step: String, parameter: String },

    #[error("step '{step}' references step '{target}' which does not exist")]
    DanglingReference { step: String, target: String },

    #[error("step '{step}' references output '{output}' which step '{target}' does not declare")]
    UnknownOutput {
        step: String,
        target: String,
        output: String,
    },

    #[error("step '{step}' depends on '{dependency}' which does not exist")]
    UnresolvedDependency { step: String, dependency: String },

    #[error("step '{step}' cannot reach '{target}', which only runs inside branch {branch}")]
    BranchScope {
        step: String,
        target: String,
        branch: String,
    },

    #[error("cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

fn pipeline_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9](-*[A-Za-z0-9]){0,255}$").expect("valid pattern"))
}

fn entity_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid pattern"))
}

/// Validate a full pipeline graph
pub fn validate_pipeline(
    name: &str,
    parameters: &[Parameter],
    steps: &[Step],
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !pipeline_name_pattern().is_match(name) {
        errors.push(ValidationError::InvalidName {
            kind: NameKind::Pipeline,
            name: name.to_string(),
        });
    }

    errors.extend(validate_parameters(parameters));

    let flat = flatten(steps);
    errors.extend(validate_step_names(&flat));
    for scoped in &flat {
        errors.extend(validate_step_shape(scoped.step));
    }

    let reference_errors = validate_references(&flat, parameters);
    let references_ok = reference_errors.is_empty();
    errors.extend(reference_errors);

    // A duplicate name makes the graph ambiguous, so cycles are only meaningful without one
    let names_unique = !errors
        .iter()
        .any(|e| matches!(e, ValidationError::DuplicateStepName { .. }));
    if references_ok && names_unique {
        if let Err(cycle) = validate_acyclic(&flat) {
            errors.push(cycle);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_parameters(parameters: &[Parameter]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for parameter in parameters {
        if !entity_name_pattern().is_match(&parameter.name) {
            errors.push(ValidationError::InvalidName {
                kind: NameKind::Parameter,
                name: parameter.name.clone(),
            });
        }
        if !seen.insert(parameter.name.as_str()) {
            errors.push(ValidationError::DuplicateParameter {
                name: parameter.name.clone(),
            });
        }
        if let Err(reason) = parameter.check(&parameter.default) {
            errors.push(ValidationError::InvalidParameterDefault {
                name: parameter.name.clone(),
                reason,
            });
        }
    }

    errors
}

fn validate_step_names(flat: &[ScopedStep<'_>]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for scoped in flat {
        let name = scoped.step.name.as_str();
        if !entity_name_pattern().is_match(name) {
            errors.push(ValidationError::InvalidName {
                kind: NameKind::Step,
                name: name.to_string(),
            });
        }
        if !seen.insert(name) && reported.insert(name) {
            errors.push(ValidationError::DuplicateStepName {
                name: name.to_string(),
            });
        }
    }

    errors
}

fn validate_step_shape(step: &Step) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut outputs = HashSet::new();
    for output in &step.outputs {
        if !outputs.insert(output.as_str()) {
            errors.push(ValidationError::DuplicateOutput {
                step: step.name.clone(),
                output: output.clone(),
            });
        }
    }

    let is_condition = step.kind == StepKind::Condition;
    match (&step.condition, is_condition) {
        (Some(node), true) => {
            if node.conditions.is_empty() {
                errors.push(ValidationError::EmptyCondition {
                    step: step.name.clone(),
                });
            }
            if !step.outputs.is_empty() || step.payload.is_some() {
                errors.push(ValidationError::ConditionShape {
                    step: step.name.clone(),
                });
            }
        }
        (None, false) => {}
        _ => errors.push(ValidationError::ConditionMismatch {
            step: step.name.clone(),
            kind: step.kind,
        }),
    }

    if step.kind.requires_payload() && step.payload.is_none() {
        errors.push(ValidationError::MissingPayload {
            step: step.name.clone(),
            kind: step.kind,
        });
    }

    for input in step.kind.required_inputs() {
        if !step.inputs.contains_key(*input) {
            errors.push(ValidationError::MissingInput {
                step: step.name.clone(),
                kind: step.kind,
                input: input.to_string(),
            });
        }
    }

    if step.kind == StepKind::RegisterModel {
        if let Some(StepInput::Literal(value)) = step.inputs.get("approval_status") {
            let known = value.as_str().is_some_and(|s| APPROVAL_STATUSES.contains(&s));
            if !known {
                errors.push(ValidationError::InvalidApprovalStatus {
                    step: step.name.clone(),
                    value: value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
                });
            }
        }
    }

    errors
}

fn validate_references(flat: &[ScopedStep<'_>], parameters: &[Parameter]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let parameter_names: HashSet<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
    let by_name: HashMap<&str, &ScopedStep<'_>> =
        flat.iter().map(|s| (s.step.name.as_str(), s)).collect();

    for scoped in flat {
        let step = scoped.step;

        for parameter in step.parameter_refs() {
            if !parameter_names.contains(parameter) {
                errors.push(ValidationError::UnknownParameter {
                    step: step.name.clone(),
                    parameter: parameter.to_string(),
                });
            }
        }

        for reference in step.references() {
            match by_name.get(reference.step.as_str()) {
                None => errors.push(ValidationError::DanglingReference {
                    step: step.name.clone(),
                    target: reference.step.clone(),
                }),
                Some(target) => {
                    if !target.step.has_output(&reference.output) {
                        errors.push(ValidationError::UnknownOutput {
                            step: step.name.clone(),
                            target: reference.step.clone(),
                            output: reference.output.clone(),
                        });
                    }
                    if let Some(err) = scope_error(scoped, target) {
                        errors.push(err);
                    }
                }
            }
        }

        for dependency in &step.depends_on {
            match by_name.get(dependency.as_str()) {
                None => errors.push(ValidationError::UnresolvedDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                }),
                Some(target) => {
                    if let Some(err) = scope_error(scoped, target) {
                        errors.push(err);
                    }
                }
            }
        }
    }

    errors
}

fn scope_error(from: &ScopedStep<'_>, target: &ScopedStep<'_>) -> Option<ValidationError> {
    if from.can_see(&target.scope) {
        return None;
    }
    let branch = target
        .scope
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" > ");
    Some(ValidationError::BranchScope {
        step: from.step.name.clone(),
        target: target.step.name.clone(),
        branch,
    })
}

/// DFS with a recursion stack; reports the first cycle path found
fn validate_acyclic(flat: &[ScopedStep<'_>]) -> Result<(), ValidationError> {
    let graph: HashMap<&str, BTreeSet<String>> = flat
        .iter()
        .map(|s| (s.step.name.as_str(), s.dependencies()))
        .collect();

    let mut visited = HashSet::new();
    let mut stack = Vec::new();

    let mut names: Vec<&str> = graph.keys().copied().collect();
    names.sort_unstable();

    for name in names {
        if !visited.contains(name) {
            if let Some(cycle) = dfs_cycle(name, &graph, &mut visited, &mut stack) {
                return Err(ValidationError::CyclicDependency { cycle });
            }
        }
    }

    Ok(())
}

fn dfs_cycle<'a>(
    node: &'a str,
    graph: &'a HashMap<&'a str, BTreeSet<String>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    stack.push(node);

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            let dep = dep.as_str();
            if let Some(pos) = stack.iter().position(|n| *n == dep) {
                let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, graph, visited, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    None
}
