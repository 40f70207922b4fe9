//! Graph compiler
//!
//! Turns a [`Graph`] into an [`ExecutionPlan`] in three passes:
//!
//! 1. Structure and type check of every node and connection
//! 2. Dependency graph construction with cycle rejection
//! 3. Kahn leveling into phases, flagging phases that may run in parallel
//!
//! [`Compiler::compile`] stops at the first error. [`Compiler::diagnose`]
//! reports every error plus non-fatal warnings, for editors and linting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{CompileError, PortDirection};
use crate::manifest::Manifest;
use crate::plan::{BindingSource, ExecutionPlan, InputBinding, Phase, PlanStep};
use crate::registry::Registry;
use crate::types::{Graph, NodeId, INITIAL_INPUTS_NODE};

/// Non-fatal findings about a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CompileWarning {
    /// A required input has no incoming connection and will fail validation
    #[serde(rename_all = "camelCase")]
    UnconnectedRequiredInput { node_id: String, port: String },
    /// A node has no connections at all
    #[serde(rename_all = "camelCase")]
    OrphanedNode { node_id: String },
}

impl std::fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnconnectedRequiredInput { node_id, port } => {
                write!(f, "Required input '{}' on node '{}' is not connected", port, node_id)
            }
            Self::OrphanedNode { node_id } => write!(f, "Node '{}' has no connections", node_id),
        }
    }
}

/// Every problem found in a graph
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompileWarning>,
}

impl CompileReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compiles graphs against a registry
pub struct Compiler<'a> {
    registry: &'a Registry,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Compile a graph into an execution plan
    pub fn compile(&self, graph: &Graph) -> Result<ExecutionPlan, CompileError> {
        let manifests = self.resolve_manifests(graph);
        if let Some(err) = self.check_structure(graph, &manifests).into_iter().next() {
            return Err(err);
        }

        let phases = level(graph, &manifests)?;

        let mut steps = HashMap::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            let manifest = manifests
                .get(node.id.as_str())
                .cloned()
                .ok_or_else(|| CompileError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                })?;
            let bindings = graph
                .incoming(&node.id)
                .into_iter()
                .map(|conn| InputBinding {
                    port: conn.to.port.clone(),
                    source: if conn.is_initial() {
                        BindingSource::Initial {
                            port: conn.from.port.clone(),
                        }
                    } else {
                        BindingSource::Node {
                            node_id: conn.from.node_id.clone(),
                            port: conn.from.port.clone(),
                        }
                    },
                })
                .collect();
            steps.insert(
                node.id.clone(),
                PlanStep {
                    node: node.clone(),
                    manifest,
                    bindings,
                },
            );
        }

        let plan = ExecutionPlan {
            graph_id: graph.id.clone(),
            phases,
            steps,
        };
        log::debug!("Compiled graph '{}': {}", graph.id, plan.summary());
        Ok(plan)
    }

    /// Collect every error and warning without stopping at the first
    pub fn diagnose(&self, graph: &Graph) -> CompileReport {
        let manifests = self.resolve_manifests(graph);
        let mut errors = self.check_structure(graph, &manifests);
        if errors.is_empty() {
            if let Err(cycle) = level(graph, &manifests) {
                errors.push(cycle);
            }
        }

        let mut warnings = Vec::new();
        for node in &graph.nodes {
            let incoming = graph.incoming(&node.id);
            if incoming.is_empty() && graph.outgoing(&node.id).is_empty() && graph.nodes.len() > 1 {
                warnings.push(CompileWarning::OrphanedNode {
                    node_id: node.id.clone(),
                });
            }
            if let Some(manifest) = manifests.get(node.id.as_str()) {
                for port in manifest.inputs.iter().filter(|p| p.required) {
                    if !incoming.iter().any(|c| c.to.port == port.name) {
                        warnings.push(CompileWarning::UnconnectedRequiredInput {
                            node_id: node.id.clone(),
                            port: port.name.clone(),
                        });
                    }
                }
            }
        }

        CompileReport { errors, warnings }
    }

    /// Manifest per node id, for nodes whose type is registered
    fn resolve_manifests<'g>(&self, graph: &'g Graph) -> HashMap<&'g str, Arc<Manifest>> {
        graph
            .nodes
            .iter()
            .filter_map(|n| {
                self.registry
                    .lookup(&n.node_type)
                    .ok()
                    .map(|m| (n.id.as_str(), m))
            })
            .collect()
    }

    fn check_structure(
        &self,
        graph: &Graph,
        manifests: &HashMap<&str, Arc<Manifest>>,
    ) -> Vec<CompileError> {
        let mut errors = Vec::new();

        let mut seen: HashSet<&str> = HashSet::new();
        for node in &graph.nodes {
            if node.id == INITIAL_INPUTS_NODE {
                errors.push(CompileError::ReservedNodeId(node.id.clone()));
            }
            if !seen.insert(node.id.as_str()) {
                errors.push(CompileError::DuplicateNodeId(node.id.clone()));
            }
            if !self.registry.has_node_type(&node.node_type) {
                errors.push(CompileError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
            }
        }

        let mut fed: HashSet<(&str, &str)> = HashSet::new();
        for conn in &graph.connections {
            let target_known = seen.contains(conn.to.node_id.as_str());
            let source_known = conn.is_initial() || seen.contains(conn.from.node_id.as_str());
            for (known, endpoint) in [(source_known, &conn.from), (target_known, &conn.to)] {
                if !known {
                    errors.push(CompileError::UnknownNode {
                        connection: conn.clone(),
                        node_id: endpoint.node_id.clone(),
                    });
                }
            }
            if !(source_known && target_known) {
                continue;
            }

            if !fed.insert((conn.to.node_id.as_str(), conn.to.port.as_str())) {
                errors.push(CompileError::AmbiguousInput {
                    node_id: conn.to.node_id.clone(),
                    port: conn.to.port.clone(),
                });
            }

            let Some(target_manifest) = manifests.get(conn.to.node_id.as_str()) else {
                continue;
            };
            let Some(target_port) = target_manifest.input_port(&conn.to.port) else {
                errors.push(CompileError::UnknownPort {
                    node_id: conn.to.node_id.clone(),
                    port: conn.to.port.clone(),
                    direction: PortDirection::Input,
                });
                continue;
            };
            if conn.is_initial() {
                continue;
            }

            let Some(source_manifest) = manifests.get(conn.from.node_id.as_str()) else {
                continue;
            };
            let Some(source_port) = source_manifest.output_port(&conn.from.port) else {
                errors.push(CompileError::UnknownPort {
                    node_id: conn.from.node_id.clone(),
                    port: conn.from.port.clone(),
                    direction: PortDirection::Output,
                });
                continue;
            };

            if !target_port.port_type.accepts_port(&source_port.port_type) {
                errors.push(CompileError::TypeMismatch {
                    connection: conn.clone(),
                    source_type: source_port.port_type.to_string(),
                    target_type: target_port.port_type.to_string(),
                });
            }
        }

        errors
    }
}

/// Peel zero in-degree sets into phases
fn level(graph: &Graph, manifests: &HashMap<&str, Arc<Manifest>>) -> Result<Vec<Phase>, CompileError> {
    let order: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> = order.keys().map(|id| (*id, 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for conn in graph.connections.iter().filter(|c| !c.is_initial()) {
        adjacency
            .entry(conn.from.node_id.as_str())
            .or_default()
            .push(conn.to.node_id.as_str());
        if let Some(degree) = in_degree.get_mut(conn.to.node_id.as_str()) {
            *degree += 1;
        }
    }

    let mut current: Vec<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut phases = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        let mut next: Vec<&str> = Vec::new();
        for node in &current {
            for &neighbor in adjacency.get(node).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(neighbor);
                    }
                }
            }
        }
        next.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));

        placed += current.len();
        let parallel = current.len() > 1
            && current
                .iter()
                .all(|id| manifests.get(id).is_some_and(|m| m.capabilities.parallel));
        phases.push(Phase {
            node_ids: current.iter().map(|id| id.to_string()).collect(),
            parallel,
        });
        current = next;
    }

    if placed < order.len() {
        let remaining: HashSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| *id)
            .collect();
        return Err(CompileError::CycleDetected {
            node_ids: find_cycle(graph, &remaining, &adjacency),
        });
    }

    Ok(phases)
}

/// Extract one concrete cycle among nodes Kahn could not place
///
/// Iterative DFS with an explicit recursion-stack set. Every remaining node
/// has an incoming edge from another remaining node, so a cycle exists.
fn find_cycle(
    graph: &Graph,
    remaining: &HashSet<&str>,
    adjacency: &HashMap<&str, Vec<&str>>,
) -> Vec<NodeId> {
    let mut visited: HashSet<&str> = HashSet::new();

    for start in graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| remaining.contains(id))
    {
        if visited.contains(start) {
            continue;
        }

        let mut path: Vec<&str> = vec![start];
        let mut on_path: HashSet<&str> = HashSet::from([start]);
        let mut cursors: Vec<usize> = vec![0];
        visited.insert(start);

        while let Some(&node) = path.last() {
            let neighbors: Vec<&str> = adjacency
                .get(node)
                .map(|n| n.iter().copied().filter(|id| remaining.contains(id)).collect())
                .unwrap_or_default();
            let Some(cursor) = cursors.last_mut() else {
                break;
            };

            if let Some(&next) = neighbors.get(*cursor) {
                *cursor += 1;
                if on_path.contains(next) {
                    let pos = path.iter().position(|id| *id == next).unwrap_or(0);
                    return path[pos..].iter().map(|id| id.to_string()).collect();
                }
                if visited.insert(next) {
                    path.push(next);
                    on_path.insert(next);
                    cursors.push(0);
                }
            } else {
                on_path.remove(node);
                path.pop();
                cursors.pop();
            }
        }
    }

    let mut ids: Vec<NodeId> = remaining.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{NodeCategory, Port};
    use crate::types::{DataType, NodeInstance, INITIAL_INPUTS_NODE};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_manifest(
                Manifest::new("source", "1", NodeCategory::Input)
                    .output(Port::optional("x", DataType::Number))
                    .output(Port::optional("label", DataType::String))
                    .parallel(),
            )
            .unwrap();
        registry
            .register_manifest(
                Manifest::new("offset", "1", NodeCategory::Transform)
                    .input(Port::required("x", DataType::Number))
                    .output(Port::optional("x", DataType::Number))
                    .parallel(),
            )
            .unwrap();
        registry
            .register_manifest(
                Manifest::new("sum", "1", NodeCategory::Transform)
                    .input(Port::required("a", DataType::Number))
                    .input(Port::required("b", DataType::Number))
                    .output(Port::optional("sum", DataType::Number)),
            )
            .unwrap();
        registry
            .register_manifest(
                Manifest::new("report", "1", NodeCategory::Output)
                    .input(Port::required("value", DataType::Any)),
            )
            .unwrap();
        registry
    }

    fn diamond() -> Graph {
        Graph::new("diamond")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("B", "offset"))
            .node(NodeInstance::new("C", "offset"))
            .node(NodeInstance::new("D", "sum"))
            .connect("A", "x", "B", "x")
            .connect("A", "x", "C", "x")
            .connect("B", "x", "D", "a")
            .connect("C", "x", "D", "b")
    }

    fn ids(phase: &Phase) -> Vec<&str> {
        phase.node_ids.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_diamond_phases() {
        let registry = registry();
        let plan = Compiler::new(&registry).compile(&diamond()).unwrap();

        let phases = plan.phases();
        assert_eq!(phases.len(), 3);
        assert_eq!(ids(&phases[0]), vec!["A"]);
        assert_eq!(ids(&phases[1]), vec!["B", "C"]);
        assert!(phases[1].parallel);
        assert_eq!(ids(&phases[2]), vec!["D"]);
        assert!(!phases[2].parallel);
    }

    #[test]
    fn test_topological_validity_and_phase_independence() {
        let registry = registry();
        let graph = diamond()
            .node(NodeInstance::new("E", "offset"))
            .node(NodeInstance::new("R", "report"))
            .connect("B", "x", "E", "x")
            .connect("E", "x", "R", "value");
        let plan = Compiler::new(&registry).compile(&graph).unwrap();

        for conn in &graph.connections {
            let from = plan.phase_of(&conn.from.node_id).unwrap();
            let to = plan.phase_of(&conn.to.node_id).unwrap();
            assert!(from < to, "{} violates phase order", conn);
        }
        for phase in plan.phases() {
            for conn in &graph.connections {
                assert!(
                    !(phase.node_ids.contains(&conn.from.node_id)
                        && phase.node_ids.contains(&conn.to.node_id)),
                    "{} connects nodes of one phase",
                    conn
                );
            }
        }
        assert_eq!(plan.node_count(), 6);
    }

    #[test]
    fn test_mixed_phase_is_sequential() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("R", "report"))
            .connect(INITIAL_INPUTS_NODE, "v", "R", "value");
        let plan = Compiler::new(&registry).compile(&graph).unwrap();
        assert_eq!(plan.phases().len(), 1);
        assert!(!plan.phases()[0].parallel);
    }

    #[test]
    fn test_type_mismatch() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("B", "offset"))
            .connect("A", "label", "B", "x");

        let err = Compiler::new(&registry).compile(&graph).unwrap_err();
        match err {
            CompileError::TypeMismatch {
                connection,
                source_type,
                target_type,
            } => {
                assert_eq!(connection.from.port, "label");
                assert_eq!(source_type, "string");
                assert_eq!(target_type, "number");
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("B", "offset"))
            .node(NodeInstance::new("C", "offset"))
            .node(NodeInstance::new("D", "report"))
            .connect("A", "x", "D", "value")
            .connect("C", "x", "B", "x")
            .connect("B", "x", "C", "x");

        let err = Compiler::new(&registry).compile(&graph).unwrap_err();
        match err {
            CompileError::CycleDetected { node_ids } => {
                assert_eq!(node_ids, vec!["B", "C"]);
            }
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_reports_only_cycle_members() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("B", "offset"))
            .node(NodeInstance::new("C", "offset"))
            .node(NodeInstance::new("R", "report"))
            .connect("B", "x", "C", "x")
            .connect("C", "x", "B", "x")
            .connect("C", "x", "R", "value");

        match Compiler::new(&registry).compile(&graph).unwrap_err() {
            CompileError::CycleDetected { node_ids } => assert_eq!(node_ids, vec!["B", "C"]),
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_input() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("A2", "source"))
            .node(NodeInstance::new("B", "offset"))
            .connect("A", "x", "B", "x")
            .connect("A2", "x", "B", "x");

        assert_eq!(
            Compiler::new(&registry).compile(&graph).unwrap_err(),
            CompileError::AmbiguousInput {
                node_id: "B".into(),
                port: "x".into()
            }
        );
    }

    #[test]
    fn test_unknown_references() {
        let registry = registry();
        let compiler = Compiler::new(&registry);

        let graph = Graph::new("g").node(NodeInstance::new("A", "teleport"));
        assert!(matches!(
            compiler.compile(&graph).unwrap_err(),
            CompileError::UnknownNodeType { .. }
        ));

        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .connect("A", "x", "ghost", "x");
        assert!(matches!(
            compiler.compile(&graph).unwrap_err(),
            CompileError::UnknownNode { node_id, .. } if node_id == "ghost"
        ));

        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("B", "offset"))
            .connect("A", "y", "B", "x");
        assert!(matches!(
            compiler.compile(&graph).unwrap_err(),
            CompileError::UnknownPort { direction: PortDirection::Output, .. }
        ));

        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("A", "source"));
        assert_eq!(
            compiler.compile(&graph).unwrap_err(),
            CompileError::DuplicateNodeId("A".into())
        );
    }

    #[test]
    fn test_reserved_initial_id_is_rejected() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new(INITIAL_INPUTS_NODE, "source"))
            .node(NodeInstance::new("B", "offset"))
            .connect(INITIAL_INPUTS_NODE, "label", "B", "x");

        assert_eq!(
            Compiler::new(&registry).compile(&graph).unwrap_err(),
            CompileError::ReservedNodeId(INITIAL_INPUTS_NODE.into())
        );
        assert!(!Compiler::new(&registry).diagnose(&graph).is_ok());
    }

    #[test]
    fn test_plan_steps_carry_bindings() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("B", "offset"))
            .connect(INITIAL_INPUTS_NODE, "seed", "B", "x");
        let plan = Compiler::new(&registry).compile(&graph).unwrap();

        let step = plan.step("B").unwrap();
        assert_eq!(step.manifest.node_type, "offset");
        assert_eq!(
            step.bindings,
            vec![InputBinding {
                port: "x".into(),
                source: BindingSource::Initial { port: "seed".into() }
            }]
        );
    }

    #[test]
    fn test_diagnose_collects_errors_and_warnings() {
        let registry = registry();
        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "source"))
            .node(NodeInstance::new("B", "offset"))
            .node(NodeInstance::new("D", "sum"))
            .node(NodeInstance::new("Z", "nope"))
            .connect("A", "label", "B", "x")
            .connect("B", "x", "D", "a");

        let report = Compiler::new(&registry).diagnose(&graph);
        assert!(!report.is_ok());
        assert_eq!(report.errors.len(), 2);
        assert!(report.warnings.contains(&CompileWarning::UnconnectedRequiredInput {
            node_id: "D".into(),
            port: "b".into()
        }));
        assert!(report
            .warnings
            .contains(&CompileWarning::OrphanedNode { node_id: "Z".into() }));
    }

    #[test]
    fn test_empty_graph_compiles_to_empty_plan() {
        let registry = registry();
        let plan = Compiler::new(&registry).compile(&Graph::new("empty")).unwrap();
        assert!(plan.is_empty());
    }
}
