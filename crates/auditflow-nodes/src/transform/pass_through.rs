//! Pass-Through Node

use std::sync::Arc;

use async_trait::async_trait;
use auditflow_engine::{
    DataType, ExecutionContext, Manifest, NodeCategory, NodeError, NodeInputs, NodeOutputs, Port,
    TypedNode, TypedRuntime,
};

/// Forwards `value` unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughNode;

impl PassThroughNode {
    pub const NODE_TYPE: &'static str = "pass-through";
    pub const PORT_VALUE: &'static str = "value";
}

#[async_trait]
impl TypedNode for PassThroughNode {
    type Config = serde_json::Value;

    fn manifest(&self) -> Manifest {
        Manifest::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Utility)
            .label("Pass Through")
            .input(Port::required(Self::PORT_VALUE, DataType::Any))
            .output(Port::optional(Self::PORT_VALUE, DataType::Any))
            .parallel()
    }

    async fn run(
        &self,
        inputs: &NodeInputs,
        _config: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let value = inputs.get(Self::PORT_VALUE).cloned().unwrap_or_default();
        Ok(NodeOutputs::from([(Self::PORT_VALUE.to_string(), value)]))
    }
}

inventory::submit!(auditflow_engine::BuiltinNode(|| Arc::new(TypedRuntime(PassThroughNode))));
