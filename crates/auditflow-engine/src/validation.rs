//! Runtime validation of node inputs and config
//!
//! Runs around a node body. Input validation checks required ports and
//! value types. Config validation checks the manifest's schema and returns a
//! normalized config with defaults filled in. Output validation holds the
//! body to its declared output ports once it returns.

use serde_json::Value;

use crate::error::NodeError;
use crate::manifest::{ConfigField, FieldKind, Manifest};
use crate::types::{NodeConfig, NodeInputs, NodeOutputs};

/// Check bound inputs against the manifest's input ports
///
/// A required port that is missing or null is an error, as is any bound
/// non-null value whose type the port does not accept. Values for
/// undeclared ports are ignored.
pub fn validate_inputs(manifest: &Manifest, inputs: &NodeInputs) -> Result<(), NodeError> {
    let mut problems = Vec::new();

    for port in &manifest.inputs {
        match inputs.get(&port.name) {
            None | Some(Value::Null) => {
                if port.required {
                    problems.push(format!("missing required input '{}'", port.name));
                }
            }
            Some(value) => {
                if !port.port_type.matches_value(value) {
                    problems.push(format!(
                        "input '{}' expected {}, got {}",
                        port.name,
                        port.port_type,
                        describe(value)
                    ));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(NodeError::InvalidInputs(problems))
    }
}

/// Check a node body's outputs against the manifest's output ports
///
/// Mirrors [`validate_inputs`]: a required port must be present and
/// non-null, and any non-null value must match the port type. Extra ports
/// are ignored.
pub fn validate_outputs(manifest: &Manifest, outputs: &NodeOutputs) -> Result<(), NodeError> {
    let mut problems = Vec::new();

    for port in &manifest.outputs {
        match outputs.get(&port.name) {
            None | Some(Value::Null) => {
                if port.required {
                    problems.push(format!("missing required output '{}'", port.name));
                }
            }
            Some(value) => {
                if !port.port_type.matches_value(value) {
                    problems.push(format!(
                        "output '{}' expected {}, got {}",
                        port.name,
                        port.port_type,
                        describe(value)
                    ));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(NodeError::InvalidOutputs(problems))
    }
}

/// Check config against the manifest's schema and fill in defaults
///
/// Keys not named by the schema pass through untouched.
pub fn validate_config(manifest: &Manifest, config: &NodeConfig) -> Result<NodeConfig, NodeError> {
    let mut normalized = config.clone();
    let mut problems = Vec::new();

    for field in &manifest.config_schema {
        match config.get(&field.name) {
            None | Some(Value::Null) => {
                if let Some(default) = &field.default {
                    normalized.insert(field.name.clone(), default.clone());
                } else if field.required {
                    problems.push(format!("missing required config '{}'", field.name));
                }
            }
            Some(value) => {
                if let Err(problem) = check_field(field, value) {
                    problems.push(problem);
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(normalized)
    } else {
        Err(NodeError::InvalidConfig(problems))
    }
}

fn check_field(field: &ConfigField, value: &Value) -> Result<(), String> {
    match field.kind {
        FieldKind::String if !value.is_string() => Err(format!(
            "config '{}' expected string, got {}",
            field.name,
            describe(value)
        )),
        FieldKind::Boolean if !value.is_boolean() => Err(format!(
            "config '{}' expected boolean, got {}",
            field.name,
            describe(value)
        )),
        FieldKind::Number => {
            let n = value.as_f64().ok_or_else(|| {
                format!("config '{}' expected number, got {}", field.name, describe(value))
            })?;
            if let Some(min) = field.min {
                if n < min {
                    return Err(format!("config '{}' is {} but must be >= {}", field.name, n, min));
                }
            }
            if let Some(max) = field.max {
                if n > max {
                    return Err(format!("config '{}' is {} but must be <= {}", field.name, n, max));
                }
            }
            Ok(())
        }
        FieldKind::Select if !field.options.contains(value) => Err(format!(
            "config '{}' must be one of {}",
            field.name,
            Value::Array(field.options.clone())
        )),
        _ => Ok(()),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
