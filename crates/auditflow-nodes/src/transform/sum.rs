//! Sum Node
//!
//! Adds up to three numbers.

use std::sync::Arc;

use async_trait::async_trait;
use auditflow_engine::{
    DataType, ExecutionContext, Manifest, NodeCategory, NodeError, NodeInputs, NodeOutputs, Port,
    TypedNode, TypedRuntime,
};
use serde_json::json;

/// Sums its bound inputs
///
/// # Inputs
/// - `a` (required)
/// - `b` (required)
/// - `c` (optional)
///
/// # Outputs
/// - `sum` - Total of the bound inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct SumNode;

impl SumNode {
    pub const NODE_TYPE: &'static str = "sum";
    pub const PORT_SUM: &'static str = "sum";
    const TERMS: [&'static str; 3] = ["a", "b", "c"];
}

#[async_trait]
impl TypedNode for SumNode {
    type Config = serde_json::Value;

    fn manifest(&self) -> Manifest {
        Manifest::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Transform)
            .label("Sum")
            .description("Adds numbers together")
            .input(Port::required("a", DataType::Number))
            .input(Port::required("b", DataType::Number))
            .input(Port::optional("c", DataType::Number))
            .output(Port::optional(Self::PORT_SUM, DataType::Number))
            .cacheable()
            .parallel()
    }

    async fn run(
        &self,
        inputs: &NodeInputs,
        _config: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let sum: f64 = Self::TERMS
            .iter()
            .filter_map(|term| inputs.get(*term).and_then(serde_json::Value::as_f64))
            .sum();
        Ok(NodeOutputs::from([(Self::PORT_SUM.to_string(), json!(sum))]))
    }
}

inventory::submit!(auditflow_engine::BuiltinNode(|| Arc::new(TypedRuntime(SumNode))));

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sums_bound_terms() {
        let inputs = NodeInputs::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(1.5)),
        ]);
        let outputs = SumNode
            .run(&inputs, json!({}), &ExecutionContext::new("g"))
            .await
            .unwrap();
        assert_eq!(outputs["sum"], json!(2.5));
    }
}
