//! Condition node model and predicate evaluation

use crate::core::step::{Step, StepInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Which arm of a condition node was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Then,
    Else,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Then => write!(f, "then"),
            Branch::Else => write!(f, "else"),
        }
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[serde(alias = "==")]
    Equals,
    #[serde(alias = "!=")]
    NotEquals,
    #[serde(alias = ">")]
    GreaterThan,
    #[serde(alias = ">=")]
    GreaterThanOrEqualTo,
    #[serde(alias = "<")]
    LessThan,
    #[serde(alias = "<=")]
    LessThanOrEqualTo,
}

impl Comparison {
    pub fn definition_name(&self) -> &'static str {
        match self {
            Comparison::Equals => "Equals",
            Comparison::NotEquals => "NotEquals",
            Comparison::GreaterThan => "GreaterThan",
            Comparison::GreaterThanOrEqualTo => "GreaterThanOrEqualTo",
            Comparison::LessThan => "LessThan",
            Comparison::LessThanOrEqualTo => "LessThanOrEqualTo",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Equals => "==",
            Comparison::NotEquals => "!=",
            Comparison::GreaterThan => ">",
            Comparison::GreaterThanOrEqualTo => ">=",
            Comparison::LessThan => "<",
            Comparison::LessThanOrEqualTo => "<=",
        };
        write!(f, "{}", symbol)
    }
}

/// Errors raised while evaluating a predicate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("cannot resolve operand: {0}")]
    Unresolved(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    NotComparable { op: Comparison, left: Value, right: Value },
}

/// A predicate over resolved runtime values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare {
        op: Comparison,
        left: StepInput,
        right: StepInput,
    },
    In {
        value: StepInput,
        candidates: Vec<StepInput>,
    },
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(op: Comparison, left: StepInput, right: StepInput) -> Self {
        Condition::Compare { op, left, right }
    }

    pub fn is_in(value: StepInput, candidates: Vec<StepInput>) -> Self {
        Condition::In { value, candidates }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    pub fn negate(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Every operand referenced anywhere in the predicate
    pub fn operands(&self) -> Vec<&StepInput> {
        match self {
            Condition::Compare { left, right, .. } => vec![left, right],
            Condition::In { value, candidates } => {
                let mut ops = vec![value];
                ops.extend(candidates.iter());
                ops
            }
            Condition::Or(conditions) => conditions.iter().flat_map(Condition::operands).collect(),
            Condition::Not(inner) => inner.operands(),
        }
    }

    /// Evaluate the predicate, resolving operands through `resolve`
    pub fn evaluate<F>(&self, resolve: &F) -> Result<bool, ConditionError>
    where
        F: Fn(&StepInput) -> Result<Value, ConditionError>,
    {
        match self {
            Condition::Compare { op, left, right } => compare_values(*op, &resolve(left)?, &resolve(right)?),
            Condition::In { value, candidates } => {
                let value = resolve(value)?;
                for candidate in candidates {
                    if values_equal(&value, &resolve(candidate)?) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Or(conditions) => {
                for condition in conditions {
                    if condition.evaluate(resolve)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(resolve)?),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare_values(op: Comparison, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    let numbers = || match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Err(ConditionError::NotComparable {
            op,
            left: left.clone(),
            right: right.clone(),
        }),
    };

    match op {
        Comparison::Equals => Ok(values_equal(left, right)),
        Comparison::NotEquals => Ok(!values_equal(left, right)),
        Comparison::GreaterThan => numbers().map(|(l, r)| l > r),
        Comparison::GreaterThanOrEqualTo => numbers().map(|(l, r)| l >= r),
        Comparison::LessThan => numbers().map(|(l, r)| l < r),
        Comparison::LessThanOrEqualTo => numbers().map(|(l, r)| l <= r),
    }
}

/// Conditional branch node: all conditions must hold for the then-arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNode {
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub then_steps: Vec<Step>,

    #[serde(default)]
    pub else_steps: Vec<Step>,
}

impl ConditionNode {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            then_steps: Vec::new(),
            else_steps: Vec::new(),
        }
    }

    pub fn then_step(mut self, step: Step) -> Self {
        self.then_steps.push(step);
        self
    }

    pub fn else_step(mut self, step: Step) -> Self {
        self.else_steps.push(step);
        self
    }

    /// Steps owned by one arm
    pub fn arm(&self, branch: Branch) -> &[Step] {
        match branch {
            Branch::Then => &self.then_steps,
            Branch::Else => &self.else_steps,
        }
    }

    /// Evaluate every condition and pick the arm to schedule
    pub fn select_branch<F>(&self, resolve: &F) -> Result<Branch, ConditionError>
    where
        F: Fn(&StepInput) -> Result<Value, ConditionError>,
    {
        for condition in &self.conditions {
            if !condition.evaluate(resolve)? {
                return Ok(Branch::Else);
            }
        }
        Ok(Branch::Then)
    }
}
