//! JSON Output Node
//!
//! Serializes its input to a JSON string so hosts can export or display it.

use std::sync::Arc;

use async_trait::async_trait;
use auditflow_engine::{
    ConfigField, DataType, ExecutionContext, FieldKind, Manifest, NodeCategory, NodeError,
    NodeInputs, NodeOutputs, Port, TypedNode, TypedRuntime,
};
use serde::Deserialize;
use serde_json::json;

/// Configuration for the JSON output node
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonOutputConfig {
    #[serde(default)]
    pub pretty: bool,
}

/// Renders `value` as JSON text
///
/// # Inputs
/// - `value` (required) - Anything
///
/// # Outputs
/// - `json` - Serialized text
///
/// Runs sequentially: output nodes never share a parallel phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOutputNode;

impl JsonOutputNode {
    pub const NODE_TYPE: &'static str = "json-output";
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_JSON: &'static str = "json";
}

#[async_trait]
impl TypedNode for JsonOutputNode {
    type Config = JsonOutputConfig;

    fn manifest(&self) -> Manifest {
        Manifest::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Output)
            .label("JSON Output")
            .description("Serializes a value to JSON text")
            .input(Port::required(Self::PORT_VALUE, DataType::Any))
            .output(Port::optional(Self::PORT_JSON, DataType::String))
            .config_field(ConfigField::new("pretty", FieldKind::Boolean).with_default(json!(false)))
    }

    async fn run(
        &self,
        inputs: &NodeInputs,
        config: JsonOutputConfig,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let value = inputs.get(Self::PORT_VALUE).cloned().unwrap_or_default();
        let text = if config.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        ctx.logger().debug(format!("Rendered {} bytes", text.len()));
        Ok(NodeOutputs::from([(Self::PORT_JSON.to_string(), json!(text))]))
    }
}

inventory::submit!(auditflow_engine::BuiltinNode(|| Arc::new(TypedRuntime(JsonOutputNode))));

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_renders_compact_and_pretty() {
        let inputs = NodeInputs::from([("value".to_string(), json!({"count": 2}))]);
        let ctx = ExecutionContext::new("g");

        let compact = JsonOutputNode
            .run(&inputs, JsonOutputConfig::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(compact["json"], json!("{\"count\":2}"));

        let pretty = JsonOutputNode
            .run(&inputs, JsonOutputConfig { pretty: true }, &ctx)
            .await
            .unwrap();
        assert!(pretty["json"].as_str().unwrap().contains('\n'));
    }

    #[test]
    fn test_not_parallel() {
        assert!(!JsonOutputNode.manifest().capabilities.parallel);
    }
}
