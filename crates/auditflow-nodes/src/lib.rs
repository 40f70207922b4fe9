//! AuditFlow Nodes
//!
//! Built-in node implementations for the AuditFlow engine. Each node is a
//! small building block that exercises the engine end to end; real audit
//! logic (OCR, fraud heuristics, matching) plugs in the same way.
//!
//! # Categories
//!
//! - **Input**: Nodes that introduce data into a graph
//! - **Transform**: Nodes that reshape or combine values
//! - **Audit**: Nodes that scan records and produce findings
//! - **Output**: Nodes that export results
//!
//! Every node submits a [`auditflow_engine::BuiltinNode`] constructor, so
//! `Registry::with_builtins()` picks them all up once this crate is linked.

pub mod audit;
pub mod input;
pub mod output;
pub mod transform;

pub use audit::*;
pub use input::*;
pub use output::*;
pub use transform::*;

/// Node types shipped by this crate
pub const BUILTIN_NODE_TYPES: &[&str] = &[
    input::ConstantNode::NODE_TYPE,
    transform::OffsetNode::NODE_TYPE,
    transform::SumNode::NODE_TYPE,
    transform::PassThroughNode::NODE_TYPE,
    audit::AmountThresholdNode::NODE_TYPE,
    output::JsonOutputNode::NODE_TYPE,
];

#[cfg(test)]
mod tests {
    use auditflow_engine::{NodeCategory, Registry};

    use super::BUILTIN_NODE_TYPES;

    #[tokio::test]
    async fn test_diamond_runs_end_to_end() {
        use std::sync::Arc;

        use auditflow_engine::{Engine, ExecutionContext, Graph, NodeInputs, NodeInstance};
        use serde_json::json;

        let graph = Graph::new("diamond")
            .node(NodeInstance::new("A", "constant").with_config("value", json!(1)))
            .node(NodeInstance::new("B", "offset"))
            .node(NodeInstance::new("C", "offset").with_config("amount", json!(0)))
            .node(NodeInstance::new("D", "sum"))
            .node(NodeInstance::new("E", "json-output"))
            .connect("A", "value", "B", "value")
            .connect("A", "value", "C", "value")
            .connect("B", "value", "D", "a")
            .connect("C", "value", "D", "b")
            .connect("D", "sum", "E", "value");

        let engine = Engine::local(Arc::new(Registry::with_builtins()));
        let plan = engine.compile(&graph).unwrap();
        let phases: Vec<Vec<&str>> = plan
            .phases()
            .iter()
            .map(|p| p.node_ids.iter().map(String::as_str).collect())
            .collect();
        assert_eq!(phases, vec![vec!["A"], vec!["B", "C"], vec!["D"], vec!["E"]]);
        assert!(plan.phases()[1].parallel);

        let run = engine
            .execute(&plan, &NodeInputs::new(), &ExecutionContext::new("diamond"))
            .await
            .unwrap();
        assert!(run.is_success());
        assert_eq!(run.outputs_of("D").unwrap()["sum"], json!(2.0));
        assert_eq!(run.outputs_of("E").unwrap()["json"], json!("2.0"));
    }

    #[test]
    fn test_inventory_collects_all_builtins() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.len(), 6, "Expected 6 built-in nodes");

        for node_type in BUILTIN_NODE_TYPES {
            assert!(registry.has_node_type(node_type), "missing {}", node_type);
        }

        let stats = registry.stats();
        assert_eq!(stats.executable, 6);
        assert_eq!(stats.by_category.get(&NodeCategory::Audit), Some(&1));
    }
}
