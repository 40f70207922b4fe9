//! Offset Node
//!
//! Adds a configured amount to a number.

use std::sync::Arc;

use async_trait::async_trait;
use auditflow_engine::{
    ConfigField, DataType, ExecutionContext, FieldKind, Manifest, NodeCategory, NodeError,
    NodeInputs, NodeOutputs, Port, TypedNode, TypedRuntime,
};
use serde::Deserialize;
use serde_json::json;

/// Configuration for the offset node
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OffsetConfig {
    #[serde(default)]
    pub amount: f64,
}

/// Adds `config.amount` to its input
///
/// # Inputs
/// - `value` (required) - Number to shift
///
/// # Outputs
/// - `value` - `value + amount`
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetNode;

impl OffsetNode {
    pub const NODE_TYPE: &'static str = "offset";
    pub const PORT_VALUE: &'static str = "value";
}

#[async_trait]
impl TypedNode for OffsetNode {
    type Config = OffsetConfig;

    fn manifest(&self) -> Manifest {
        Manifest::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Transform)
            .label("Offset")
            .description("Adds a fixed amount to a number")
            .input(Port::required(Self::PORT_VALUE, DataType::Number))
            .output(Port::optional(Self::PORT_VALUE, DataType::Number))
            .config_field(ConfigField::new("amount", FieldKind::Number).with_default(json!(0)))
            .cacheable()
            .parallel()
    }

    async fn run(
        &self,
        inputs: &NodeInputs,
        config: OffsetConfig,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let value = inputs
            .get(Self::PORT_VALUE)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| NodeError::InvalidInputs(vec!["value must be a number".into()]))?;

        Ok(NodeOutputs::from([(
            Self::PORT_VALUE.to_string(),
            json!(value + config.amount),
        )]))
    }
}

inventory::submit!(auditflow_engine::BuiltinNode(|| Arc::new(TypedRuntime(OffsetNode))));

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adds_amount() {
        let inputs = NodeInputs::from([("value".to_string(), json!(1))]);
        let outputs = OffsetNode
            .run(&inputs, OffsetConfig { amount: 2.5 }, &ExecutionContext::new("g"))
            .await
            .unwrap();
        assert_eq!(outputs["value"], json!(3.5));
    }

    #[tokio::test]
    async fn test_rejects_non_number() {
        let inputs = NodeInputs::from([("value".to_string(), json!("1"))]);
        let err = OffsetNode
            .run(&inputs, OffsetConfig::default(), &ExecutionContext::new("g"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidInputs(_)));
    }
}
