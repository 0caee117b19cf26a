//! Pipeline parameter model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Declared type of a pipeline parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Integer,
    Float,
    String,
}

impl ParameterType {
    /// Name used in the submitted pipeline definition
    pub fn definition_name(&self) -> &'static str {
        match self {
            ParameterType::Integer => "Integer",
            ParameterType::Float => "Float",
            ParameterType::String => "String",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Integer => write!(f, "integer"),
            ParameterType::Float => write!(f, "float"),
            ParameterType::String => write!(f, "string"),
        }
    }
}

/// A concrete parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// The type this value carries on its own
    pub fn value_type(&self) -> ParameterType {
        match self {
            ParameterValue::Integer(_) => ParameterType::Integer,
            ParameterValue::Float(_) => ParameterType::Float,
            ParameterValue::String(_) => ParameterType::String,
        }
    }

    /// Convert into a JSON value for definitions and step resolution
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParameterValue::Integer(i) => serde_json::Value::from(*i),
            ParameterValue::Float(f) => serde_json::Value::from(*f),
            ParameterValue::String(s) => serde_json::Value::from(s.clone()),
        }
    }

    /// Parse a raw command-line string as a value of the given type
    pub fn parse_as(ty: ParameterType, raw: &str) -> Option<Self> {
        match ty {
            ParameterType::Integer => raw.trim().parse().ok().map(ParameterValue::Integer),
            ParameterType::Float => raw.trim().parse().ok().map(ParameterValue::Float),
            ParameterType::String => Some(ParameterValue::String(raw.to_string())),
        }
    }

    /// Coerce to the declared type. Integers widen to floats; nothing else converts.
    fn coerce(&self, ty: ParameterType) -> Option<Self> {
        match (self, ty) {
            (ParameterValue::Integer(i), ParameterType::Float) => Some(ParameterValue::Float(*i as f64)),
            (value, ty) if value.value_type() == ty => Some(value.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Integer(i) => write!(f, "{}", i),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::String(value)
    }
}

/// Errors raised when checking a parameter value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("unknown parameter '{name}'")]
    Unknown { name: String },

    #[error("parameter '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: ParameterType,
        actual: ParameterType,
    },

    #[error("parameter '{name}' does not allow '{value}' (allowed: {})", .allowed.join(", "))]
    NotAllowed {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("parameter '{name}' cannot parse '{raw}' as {expected}")]
    Unparseable {
        name: String,
        expected: ParameterType,
        raw: String,
    },

    #[error("parameter '{name}' must be a finite number, got {value}")]
    NonFinite { name: String, value: f64 },
}

/// A named, typed pipeline parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ParameterType,

    pub default: ParameterValue,

    /// Enumerated allowed values (None = unrestricted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<ParameterValue>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterType, default: ParameterValue) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            allowed_values: None,
        }
    }

    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, ParameterType::Integer, ParameterValue::Integer(default))
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, ParameterType::Float, ParameterValue::Float(default))
    }

    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String, ParameterValue::String(default.into()))
    }

    /// Restrict the parameter to an enumerated set of values
    pub fn with_allowed_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParameterValue>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Check a value against the declared type and allowed values.
    ///
    /// Returns the value coerced to the declared type.
    pub fn check(&self, value: &ParameterValue) -> Result<ParameterValue, ParameterError> {
        let coerced = value.coerce(self.kind).ok_or_else(|| ParameterError::TypeMismatch {
            name: self.name.clone(),
            expected: self.kind,
            actual: value.value_type(),
        })?;

        // NaN and infinities have no JSON form, so they could never be stored
        if let ParameterValue::Float(f) = &coerced {
            if !f.is_finite() {
                return Err(ParameterError::NonFinite {
                    name: self.name.clone(),
                    value: *f,
                });
            }
        }

        if let Some(allowed) = &self.allowed_values {
            let permitted = allowed
                .iter()
                .filter_map(|a| a.coerce(self.kind))
                .any(|a| a == coerced);
            if !permitted {
                return Err(ParameterError::NotAllowed {
                    name: self.name.clone(),
                    value: coerced.to_string(),
                    allowed: allowed.iter().map(ToString::to_string).collect(),
                });
            }
        }

        Ok(coerced)
    }

    /// Parse a raw override string and check it
    pub fn parse_override(&self, raw: &str) -> Result<ParameterValue, ParameterError> {
        let value = ParameterValue::parse_as(self.kind, raw).ok_or_else(|| ParameterError::Unparseable {
            name: self.name.clone(),
            expected: self.kind,
            raw: raw.to_string(),
        })?;
        self.check(&value)
    }
}

/// Merge per-execution overrides over parameter defaults.
///
/// Every error is collected so the caller sees all bad overrides at once.
pub fn resolve_parameters(
    parameters: &[Parameter],
    overrides: &BTreeMap<String, ParameterValue>,
) -> Result<BTreeMap<String, ParameterValue>, Vec<ParameterError>> {
    let mut errors = Vec::new();

    for name in overrides.keys() {
        if !parameters.iter().any(|p| &p.name == name) {
            errors.push(ParameterError::Unknown { name: name.clone() });
        }
    }

    let mut resolved = BTreeMap::new();
    for parameter in parameters {
        let value = overrides.get(&parameter.name).unwrap_or(&parameter.default);
        match parameter.check(value) {
            Ok(v) => {
                resolved.insert(parameter.name.clone(), v);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}
