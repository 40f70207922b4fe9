//! Phase scheduler
//!
//! Walks an [`ExecutionPlan`] phase by phase. Every node of a phase settles
//! before the next phase starts; parallel phases fan out and join, others
//! run in plan order. Node failures are recorded in the results map and by
//! default never stop the run: downstream nodes simply see the port unbound.
//! With stop-on-error enabled the run ends at the first phase boundary after
//! a failure.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::backend::{ExecutionBackend, Invocation};
use crate::cache::{CacheKey, ResultCache};
use crate::context::ExecutionContext;
use crate::error::{EngineError, ErrorCode, NodeError, Result};
use crate::events::RunEvent;
use crate::plan::{BindingSource, ExecutionPlan, PlanStep, PlanSummary};
use crate::types::{NodeId, NodeInputs, NodeOutputs};
use crate::validation::{validate_config, validate_inputs, validate_outputs};

/// Failure details of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&NodeError> for ExecutionFailure {
    fn from(err: &NodeError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// Bookkeeping attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub duration_ms: u64,
    pub cached: bool,
    /// Times the node body ran; 0 for cache hits and validation failures
    pub attempts: u32,
    pub node_version: String,
    pub trace_id: String,
}

/// Outcome of one node in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub node_id: NodeId,
    pub success: bool,
    #[serde(default)]
    pub outputs: NodeOutputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    pub metadata: ResultMetadata,
}

impl ExecutionResult {
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    pub execution_id: String,
    pub results: HashMap<NodeId, ExecutionResult>,
    pub summary: PlanSummary,
    /// Cancellation stopped the run before every phase ran
    pub cancelled: bool,
    /// A node failure stopped the run before every phase ran
    pub stopped_on_error: bool,
    pub duration_ms: u64,
}

impl RunResults {
    pub fn get(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.results.get(node_id)
    }

    /// Outputs of a node that succeeded
    pub fn outputs_of(&self, node_id: &str) -> Option<&NodeOutputs> {
        self.results
            .get(node_id)
            .filter(|r| r.success)
            .map(|r| &r.outputs)
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| !r.success).count()
    }

    /// Every planned node ran and succeeded
    pub fn is_success(&self) -> bool {
        !self.cancelled && !self.stopped_on_error && self.failed() == 0 && self.results.len() == self.summary.total_nodes
    }
}

/// Drives execution plans through a backend
pub struct Scheduler {
    backend: Arc<dyn ExecutionBackend>,
    cache: Option<Arc<dyn ResultCache>>,
    max_parallel_nodes: Option<usize>,
    stop_on_error: bool,
}

impl Scheduler {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            cache: None,
            max_parallel_nodes: None,
            stop_on_error: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cap concurrent nodes within a parallel phase
    pub fn with_max_parallel_nodes(mut self, max: usize) -> Self {
        self.max_parallel_nodes = Some(max.max(1));
        self
    }

    /// End the run at the first phase boundary after any node fails
    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn cache(&self) -> Option<&Arc<dyn ResultCache>> {
        self.cache.as_ref()
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    /// Run every phase of a plan
    ///
    /// Cancellation, and failures when stop-on-error is set, are checked
    /// before each phase; a phase already running is allowed to settle.
    /// Nodes of phases that never started have no entry in the results map.
    pub async fn execute_graph(
        &self,
        plan: &ExecutionPlan,
        initial_inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<RunResults> {
        for id in plan.phases().iter().flat_map(|p| p.node_ids.iter()) {
            if plan.step(id).is_none() {
                return Err(EngineError::MissingStep(id.clone()));
            }
        }

        let started = Instant::now();
        let summary = plan.summary();
        log::info!(
            "Executing graph '{}' [{}] on {} backend: {}",
            plan.graph_id(),
            ctx.execution_id(),
            self.backend.name(),
            summary
        );
        ctx.emit(RunEvent::RunStarted {
            execution_id: ctx.execution_id().to_string(),
            graph_id: plan.graph_id().to_string(),
            total_phases: summary.total_phases,
        });

        let mut results: HashMap<NodeId, ExecutionResult> = HashMap::with_capacity(summary.total_nodes);
        let mut cancelled = false;
        let mut stopped_on_error = false;

        for (index, phase) in plan.phases().iter().enumerate() {
            if ctx.is_cancelled() {
                log::info!(
                    "Run {} cancelled after {} of {} phases",
                    ctx.execution_id(),
                    index,
                    summary.total_phases
                );
                ctx.emit(RunEvent::RunCancelled {
                    execution_id: ctx.execution_id().to_string(),
                    completed_phases: index,
                });
                cancelled = true;
                break;
            }

            if self.stop_on_error {
                let failed: Vec<NodeId> = results
                    .values()
                    .filter(|r| !r.success)
                    .map(|r| r.node_id.clone())
                    .collect();
                if !failed.is_empty() {
                    log::info!(
                        "Run {} stopped after {} of {} phases: {} failed",
                        ctx.execution_id(),
                        index,
                        summary.total_phases,
                        failed.join(", ")
                    );
                    ctx.emit(RunEvent::RunStopped {
                        execution_id: ctx.execution_id().to_string(),
                        completed_phases: index,
                        failed,
                    });
                    stopped_on_error = true;
                    break;
                }
            }

            log::debug!(
                "Phase {} ({}): {:?}",
                index,
                if phase.parallel { "parallel" } else { "sequential" },
                phase.node_ids
            );
            ctx.emit(RunEvent::PhaseStarted {
                execution_id: ctx.execution_id().to_string(),
                phase: index,
                node_ids: phase.node_ids.clone(),
                parallel: phase.parallel,
            });

            let jobs: Vec<(&PlanStep, NodeInputs)> = phase
                .node_ids
                .iter()
                .filter_map(|id| plan.step(id))
                .map(|step| (step, gather_inputs(step, &results, initial_inputs)))
                .collect();

            let phase_results: Vec<ExecutionResult> = if phase.parallel {
                let runs = jobs
                    .into_iter()
                    .map(|(step, inputs)| self.execute_one(step, inputs, ctx));
                match self.max_parallel_nodes {
                    Some(limit) => stream::iter(runs).buffer_unordered(limit).collect().await,
                    None => join_all(runs).await,
                }
            } else {
                let mut sequential = Vec::with_capacity(jobs.len());
                for (step, inputs) in jobs {
                    sequential.push(self.execute_one(step, inputs, ctx).await);
                }
                sequential
            };

            let failed = phase_results.iter().filter(|r| !r.success).count();
            for result in phase_results {
                if results.contains_key(&result.node_id) {
                    log::error!("Node '{}' produced a second result; keeping the first", result.node_id);
                    continue;
                }
                results.insert(result.node_id.clone(), result);
            }
            ctx.emit(RunEvent::PhaseCompleted {
                execution_id: ctx.execution_id().to_string(),
                phase: index,
                failed,
            });
        }

        let run = RunResults {
            execution_id: ctx.execution_id().to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            results,
            summary,
            cancelled,
            stopped_on_error,
        };
        log::info!(
            "Run {} finished in {}ms: {} succeeded, {} failed",
            run.execution_id,
            run.duration_ms,
            run.succeeded(),
            run.failed()
        );
        ctx.emit(RunEvent::RunCompleted {
            execution_id: run.execution_id.clone(),
            succeeded: run.succeeded(),
            failed: run.failed(),
            duration_ms: run.duration_ms,
        });
        Ok(run)
    }

    /// Run a single node: cache lookup, validation, dispatch, cache store
    ///
    /// A cache hit returns immediately and skips validation entirely. Outputs
    /// that do not match the declared ports fail the node and are not cached.
    pub async fn execute_one(
        &self,
        step: &PlanStep,
        inputs: NodeInputs,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let node_id = step.node.id.as_str();
        let manifest = step.manifest.as_ref();
        let node_ctx = ctx.for_node(node_id);
        let started = Instant::now();

        node_ctx.emit(RunEvent::NodeStarted {
            execution_id: ctx.execution_id().to_string(),
            node_id: node_id.to_string(),
            node_type: manifest.node_type.clone(),
        });

        let cache = self.cache.as_ref().filter(|_| manifest.capabilities.cacheable);
        let cache_key = match cache {
            Some(_) => match CacheKey::compute(&manifest.node_type, &inputs, &step.node.config) {
                Ok(key) => Some(key),
                Err(e) => {
                    log::warn!("Not caching node '{}': {}", node_id, e);
                    None
                }
            },
            None => None,
        };

        if let (Some(cache), Some(key)) = (cache, cache_key.as_ref()) {
            if let Some(outputs) = cache.get(key).await {
                log::debug!("Node '{}' served from cache", node_id);
                return self.finish(&node_ctx, step, started, Ok(outputs), 0, true);
            }
        }

        let (result, attempts) = match self.validate_and_dispatch(step, &inputs, &node_ctx).await {
            Ok((outputs, attempts)) => (Ok(outputs), attempts),
            Err((err, attempts)) => (Err(err), attempts),
        };

        if let (Some(cache), Some(key), Ok(outputs)) = (cache, cache_key, result.as_ref()) {
            cache.put(key, outputs.clone()).await;
        }

        self.finish(&node_ctx, step, started, result, attempts, false)
    }

    async fn validate_and_dispatch(
        &self,
        step: &PlanStep,
        inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> std::result::Result<(NodeOutputs, u32), (NodeError, u32)> {
        let manifest = step.manifest.as_ref();
        validate_inputs(manifest, inputs).map_err(|e| (e, 0))?;
        let config = validate_config(manifest, &step.node.config).map_err(|e| (e, 0))?;

        let dispatch = self
            .backend
            .dispatch(
                Invocation {
                    node_id: &step.node.id,
                    manifest,
                    inputs,
                    config: &config,
                },
                ctx,
            )
            .await;

        match dispatch.result {
            Ok(outputs) => {
                validate_outputs(manifest, &outputs).map_err(|e| (e, dispatch.attempts))?;
                Ok((outputs, dispatch.attempts))
            }
            Err(err) => Err((err, dispatch.attempts)),
        }
    }

    fn finish(
        &self,
        ctx: &ExecutionContext,
        step: &PlanStep,
        started: Instant,
        result: std::result::Result<NodeOutputs, NodeError>,
        attempts: u32,
        cached: bool,
    ) -> ExecutionResult {
        let duration_ms = started.elapsed().as_millis() as u64;
        let metadata = ResultMetadata {
            duration_ms,
            cached,
            attempts,
            node_version: step.manifest.version.clone(),
            trace_id: ctx.execution_id().to_string(),
        };
        let node_id = step.node.id.clone();

        match result {
            Ok(outputs) => {
                ctx.emit(RunEvent::NodeCompleted {
                    execution_id: ctx.execution_id().to_string(),
                    node_id: node_id.clone(),
                    cached,
                    duration_ms,
                });
                ExecutionResult {
                    node_id,
                    success: true,
                    outputs,
                    error: None,
                    metadata,
                }
            }
            Err(err) => {
                log::warn!("Node '{}' failed [{}]: {}", node_id, err.code(), err);
                let failure = ExecutionFailure::from(&err);
                ctx.emit(RunEvent::NodeFailed {
                    execution_id: ctx.execution_id().to_string(),
                    node_id: node_id.clone(),
                    code: failure.code,
                    message: failure.message.clone(),
                });
                ExecutionResult {
                    node_id,
                    success: false,
                    outputs: NodeOutputs::new(),
                    error: Some(failure),
                    metadata,
                }
            }
        }
    }
}

/// Bind a step's inputs from upstream results and initial inputs
///
/// Ports fed by a failed upstream node, or by a missing output, stay unbound.
fn gather_inputs(
    step: &PlanStep,
    results: &HashMap<NodeId, ExecutionResult>,
    initial_inputs: &NodeInputs,
) -> NodeInputs {
    let mut inputs = NodeInputs::with_capacity(step.bindings.len());
    for binding in &step.bindings {
        let value = match &binding.source {
            BindingSource::Node { node_id, port } => results
                .get(node_id)
                .filter(|r| r.success)
                .and_then(|r| r.outputs.get(port)),
            BindingSource::Initial { port } => initial_inputs.get(port),
        };
        if let Some(value) = value {
            inputs.insert(binding.port.clone(), value.clone());
        }
    }
    inputs
}
