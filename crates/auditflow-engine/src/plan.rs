//! Execution plans
//!
//! A plan is the compiler's output: an ordered list of phases plus one step
//! per node holding everything the scheduler needs to run it. Each node sits
//! in exactly one phase and all of its upstream nodes sit in earlier phases.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;
use crate::types::{NodeId, NodeInstance};

/// A set of nodes with no dependencies among them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub node_ids: Vec<NodeId>,
    /// Whether the nodes may run concurrently
    pub parallel: bool,
}

/// Where a bound input value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    /// Output port of an upstream node
    Node { node_id: NodeId, port: String },
    /// Named entry of the run's initial inputs
    Initial { port: String },
}

/// A connection resolved onto a node's input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub port: String,
    pub source: BindingSource,
}

/// Everything needed to execute one node
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub node: NodeInstance,
    pub manifest: Arc<Manifest>,
    pub bindings: Vec<InputBinding>,
}

/// Compiled, dependency-ordered execution plan
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub(crate) graph_id: String,
    pub(crate) phases: Vec<Phase>,
    pub(crate) steps: HashMap<NodeId, PlanStep>,
}

impl ExecutionPlan {
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn step(&self, node_id: &str) -> Option<&PlanStep> {
        self.steps.get(node_id)
    }

    /// Index of the phase containing a node
    pub fn phase_of(&self, node_id: &str) -> Option<usize> {
        self.phases
            .iter()
            .position(|p| p.node_ids.iter().any(|id| id == node_id))
    }

    pub fn node_count(&self) -> usize {
        self.phases.iter().map(|p| p.node_ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Shape of the plan
    ///
    /// The parallelization factor compares running every phase back to back
    /// against running parallel phases at `1/width` of a unit phase cost.
    pub fn summary(&self) -> PlanSummary {
        let total_phases = self.phases.len();
        let parallel_cost: f64 = self
            .phases
            .iter()
            .map(|p| {
                if p.parallel {
                    1.0 / p.node_ids.len() as f64
                } else {
                    1.0
                }
            })
            .sum();
        let parallelization_factor = if parallel_cost > 0.0 {
            total_phases as f64 / parallel_cost
        } else {
            1.0
        };

        PlanSummary {
            total_phases,
            total_nodes: self.node_count(),
            parallel_phases: self.phases.iter().filter(|p| p.parallel).count(),
            max_phase_width: self.phases.iter().map(|p| p.node_ids.len()).max().unwrap_or(0),
            parallelization_factor,
        }
    }
}

/// Summary statistics of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_phases: usize,
    pub total_nodes: usize,
    pub parallel_phases: usize,
    pub max_phase_width: usize,
    pub parallelization_factor: f64,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} phases, {} nodes, {:.2}x parallelization",
            self.total_phases, self.total_nodes, self.parallelization_factor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(ids: &[&str], parallel: bool) -> Phase {
        Phase {
            node_ids: ids.iter().map(|s| s.to_string()).collect(),
            parallel,
        }
    }

    #[test]
    fn test_summary_of_diamond() {
        let plan = ExecutionPlan {
            graph_id: "g".into(),
            phases: vec![phase(&["a"], false), phase(&["b", "c"], true), phase(&["d"], false)],
            steps: HashMap::new(),
        };
        let summary = plan.summary();
        assert_eq!(summary.total_phases, 3);
        assert_eq!(summary.total_nodes, 4);
        assert_eq!(summary.parallel_phases, 1);
        assert_eq!(summary.max_phase_width, 2);
        assert!((summary.parallelization_factor - 1.2).abs() < 1e-9);
        assert_eq!(plan.phase_of("c"), Some(1));
        assert_eq!(plan.phase_of("z"), None);
    }

    #[test]
    fn test_sequential_wide_phase_counts_fully() {
        let plan = ExecutionPlan {
            phases: vec![phase(&["a", "b"], false)],
            ..Default::default()
        };
        assert_eq!(plan.summary().parallelization_factor, 1.0);
    }

    #[test]
    fn test_empty_plan_summary() {
        let summary = ExecutionPlan::default().summary();
        assert_eq!(summary.total_phases, 0);
        assert_eq!(summary.parallelization_factor, 1.0);
        assert_eq!(summary.to_string(), "0 phases, 0 nodes, 1.00x parallelization");
    }
}
