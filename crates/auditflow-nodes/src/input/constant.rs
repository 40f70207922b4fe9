//! Constant Node
//!
//! Emits a value fixed in the node's config. Useful as a graph source and
//! in tests.

use std::sync::Arc;

use async_trait::async_trait;
use auditflow_engine::{
    ConfigField, DataType, ExecutionContext, FieldKind, Manifest, NodeCategory, NodeError,
    NodeInputs, NodeOutputs, Port, TypedNode, TypedRuntime,
};
use serde::Deserialize;

/// Configuration for the constant node
#[derive(Debug, Clone, Deserialize)]
pub struct ConstantConfig {
    /// Value written to the `value` output
    pub value: serde_json::Value,
}

/// Source node emitting `config.value`
///
/// # Outputs
/// - `value` - The configured value
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantNode;

impl ConstantNode {
    pub const NODE_TYPE: &'static str = "constant";
    /// Port ID for the value output
    pub const PORT_VALUE: &'static str = "value";
}

#[async_trait]
impl TypedNode for ConstantNode {
    type Config = ConstantConfig;

    fn manifest(&self) -> Manifest {
        Manifest::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Input)
            .label("Constant")
            .description("Emits a fixed value")
            .output(Port::optional(Self::PORT_VALUE, DataType::Any))
            .config_field(ConfigField::new("value", FieldKind::Json).required())
            .cacheable()
            .parallel()
    }

    async fn run(
        &self,
        _inputs: &NodeInputs,
        config: ConstantConfig,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        Ok(NodeOutputs::from([(Self::PORT_VALUE.to_string(), config.value)]))
    }
}

inventory::submit!(auditflow_engine::BuiltinNode(|| Arc::new(TypedRuntime(ConstantNode))));

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_emits_configured_value() {
        let config = ConstantConfig {
            value: json!({"type": "records", "rows": []}),
        };
        let outputs = ConstantNode
            .run(&NodeInputs::new(), config, &ExecutionContext::new("g"))
            .await
            .unwrap();
        assert_eq!(outputs["value"]["type"], "records");
    }

    #[test]
    fn test_manifest_is_valid() {
        let manifest = ConstantNode.manifest();
        assert!(manifest.check().is_ok());
        assert!(manifest.inputs.is_empty());
        assert!(manifest.capabilities.cacheable);
    }
}
