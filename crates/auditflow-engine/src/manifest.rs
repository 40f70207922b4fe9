//! Node manifests
//!
//! A manifest is the single source of truth for a node type: its ports,
//! config schema, capabilities and retry budget. The runtime that implements
//! the node hands its manifest to the registry once, at registration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DataType, PortType};

/// Category of a node, used for grouping in listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    /// Data import and constant sources
    Input,
    /// Reshaping, filtering and arithmetic
    Transform,
    /// Detection nodes producing findings
    Audit,
    /// Reports and exports
    Output,
    Utility,
}

/// Behavioural flags the scheduler honours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    /// Results may be memoized by (type, inputs, config)
    pub cacheable: bool,
    /// Safe to run concurrently with other nodes of the same phase
    pub parallel: bool,
    /// Emits incremental output
    pub streaming: bool,
}

/// Port declaration on a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Port {
    /// Create a required port
    pub fn required(name: impl Into<String>, port_type: impl Into<PortType>) -> Self {
        Self {
            name: name.into(),
            port_type: port_type.into(),
            required: true,
            description: None,
        }
    }

    /// Create an optional port
    pub fn optional(name: impl Into<String>, port_type: impl Into<PortType>) -> Self {
        Self {
            required: false,
            ..Self::required(name, port_type)
        }
    }

    /// Create a port accepting any of several types
    pub fn one_of(name: impl Into<String>, types: Vec<DataType>, required: bool) -> Self {
        Self {
            required,
            ..Self::required(name, PortType::OneOf(types))
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Kind of value a config field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// One of a fixed list of options
    Select,
    /// Arbitrary JSON
    Json,
}

/// One entry of a manifest's config schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConfigField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            options: Vec::new(),
            min: None,
            max: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = Value>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// Complete description of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Unique type identifier (e.g., "amount-threshold")
    #[serde(rename = "type")]
    pub node_type: String,
    pub version: String,
    pub category: NodeCategory,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default)]
    pub config_schema: Vec<ConfigField>,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Extra local attempts after the first failure
    #[serde(default)]
    pub retry: u32,
}

impl Manifest {
    pub fn new(
        node_type: impl Into<String>,
        version: impl Into<String>,
        category: NodeCategory,
    ) -> Self {
        let node_type = node_type.into();
        Self {
            label: node_type.clone(),
            node_type,
            version: version.into(),
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_schema: Vec::new(),
            capabilities: Capabilities::default(),
            retry: 0,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn config_field(mut self, field: ConfigField) -> Self {
        self.config_schema.push(field);
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.capabilities.cacheable = true;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.capabilities.parallel = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.capabilities.streaming = true;
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// Find an input port by name
    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Find an output port by name
    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Check structural well-formedness, returning the first problem found
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.node_type.trim().is_empty() {
            return Err("type must not be empty".to_string());
        }
        if self.version.trim().is_empty() {
            return Err("version must not be empty".to_string());
        }
        for (list, ports) in [("input", &self.inputs), ("output", &self.outputs)] {
            for (i, port) in ports.iter().enumerate() {
                if port.name.is_empty() {
                    return Err(format!("{} port #{} has an empty name", list, i));
                }
                if ports[..i].iter().any(|p| p.name == port.name) {
                    return Err(format!("duplicate {} port '{}'", list, port.name));
                }
                if port.port_type.members().is_empty() {
                    return Err(format!("{} port '{}' declares no types", list, port.name));
                }
            }
        }
        for (i, field) in self.config_schema.iter().enumerate() {
            if self.config_schema[..i].iter().any(|f| f.name == field.name) {
                return Err(format!("duplicate config field '{}'", field.name));
            }
            if field.kind == FieldKind::Select && field.options.is_empty() {
                return Err(format!("select field '{}' has no options", field.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Manifest {
        Manifest::new("amount-threshold", "1.0.0", NodeCategory::Audit)
            .input(Port::required("records", DataType::Records))
            .output(Port::optional("flagged", DataType::RiskSet))
            .config_field(ConfigField::new("threshold", FieldKind::Number).required())
            .cacheable()
            .parallel()
    }

    #[test]
    fn test_port_builders() {
        let port = Port::required("amount", DataType::Number);
        assert!(port.required);
        assert!(!Port::optional("note", DataType::String).required);

        let union = Port::one_of("source", vec![DataType::Ledger, DataType::Vouchers], true);
        assert_eq!(union.port_type.members().len(), 2);
    }

    #[test]
    fn test_manifest_serialization_is_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "amount-threshold");
        assert!(json.get("configSchema").is_some());
        assert_eq!(json["capabilities"]["cacheable"], true);
        assert_eq!(json["retry"], 0);
    }

    #[test]
    fn test_manifest_parses_with_defaults() {
        let manifest: Manifest = serde_json::from_value(json!({
            "type": "ocr",
            "version": "2.1.0",
            "category": "input",
            "outputs": [{"name": "text", "type": ["string", "data_block"]}]
        }))
        .unwrap();
        assert_eq!(manifest.retry, 0);
        assert!(!manifest.capabilities.parallel);
        assert!(manifest.output_port("text").is_some());
    }

    #[test]
    fn test_check_rejects_duplicate_ports() {
        let manifest = sample().input(Port::optional("records", DataType::Ledger));
        let err = manifest.check().unwrap_err();
        assert!(err.contains("duplicate input port"));
    }

    #[test]
    fn test_check_rejects_empty_version() {
        let manifest = Manifest::new("x", " ", NodeCategory::Utility);
        assert!(manifest.check().is_err());
        assert!(sample().check().is_ok());
    }
}
