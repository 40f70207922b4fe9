//! Engine facade
//!
//! Bundles a registry with a configured scheduler so hosts can go from a
//! graph document to results in one call.
//!
//! ```ignore
//! let engine = Engine::from_config(Arc::new(Registry::with_builtins()), &config)?;
//! let run = engine.run(&graph, &NodeInputs::new(), &ExecutionContext::new(&graph.id)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{ExecutionBackend, HttpTaskClient, LocalBackend, RemoteBackend, TaskClient};
use crate::cache::{CacheStats, InMemoryCache, ResultCache};
use crate::compiler::{CompileReport, Compiler};
use crate::config::{EngineConfig, ExecutionMode, RetryConfig};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::plan::ExecutionPlan;
use crate::registry::Registry;
use crate::scheduler::{RunResults, Scheduler};
use crate::types::{Graph, NodeInputs};

/// Registry, compiler and scheduler behind one handle
pub struct Engine {
    registry: Arc<Registry>,
    scheduler: Scheduler,
}

impl Engine {
    /// Engine running nodes in-process with default retry timing
    pub fn local(registry: Arc<Registry>) -> Self {
        let backend = LocalBackend::new(registry.clone(), &RetryConfig::default());
        Self::with_backend(registry, Arc::new(backend))
    }

    /// Engine submitting nodes to a task service through `client`
    pub fn remote(registry: Arc<Registry>, client: Arc<dyn TaskClient>, config: &EngineConfig) -> Self {
        let backend = RemoteBackend::new(client, &config.remote);
        Self::with_backend(registry, Arc::new(backend))
    }

    pub fn with_backend(registry: Arc<Registry>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            registry,
            scheduler: Scheduler::new(backend),
        }
    }

    /// Build an engine from configuration
    ///
    /// Remote mode talks HTTP to `config.remote.endpoint`. The cache is an
    /// in-memory cache unless disabled.
    pub fn from_config(registry: Arc<Registry>, config: &EngineConfig) -> Result<Self> {
        let mut engine = match config.mode {
            ExecutionMode::Local => {
                let backend = LocalBackend::new(registry.clone(), &config.retry);
                Self::with_backend(registry, Arc::new(backend))
            }
            ExecutionMode::Remote => {
                let client = HttpTaskClient::new(
                    config.remote.endpoint.clone(),
                    config.remote.request_timeout(),
                )?;
                Self::remote(registry, Arc::new(client), config)
            }
        };

        if config.cache.enabled {
            let mut cache = InMemoryCache::new();
            if let Some(ttl) = config.cache.ttl_secs {
                cache = cache.with_ttl(Duration::from_secs(ttl));
            }
            if let Some(max) = config.cache.max_entries {
                cache = cache.with_max_entries(max);
            }
            engine = engine.with_cache(Arc::new(cache));
        }
        if let Some(max) = config.max_parallel_nodes {
            engine.scheduler = engine.scheduler.with_max_parallel_nodes(max);
        }
        if config.stop_on_error {
            engine.scheduler = engine.scheduler.with_stop_on_error(true);
        }

        log::info!(
            "Engine ready: {} backend, {} node types, cache {}",
            engine.scheduler.backend().name(),
            engine.registry.len(),
            if config.cache.enabled { "on" } else { "off" }
        );
        Ok(engine)
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.scheduler = self.scheduler.with_cache(cache);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Compile a graph against this engine's registry
    pub fn compile(&self, graph: &Graph) -> Result<ExecutionPlan> {
        Ok(Compiler::new(&self.registry).compile(graph)?)
    }

    /// Report every compile error and warning for a graph
    pub fn diagnose(&self, graph: &Graph) -> CompileReport {
        Compiler::new(&self.registry).diagnose(graph)
    }

    /// Execute a compiled plan
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        initial_inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<RunResults> {
        self.scheduler.execute_graph(plan, initial_inputs, ctx).await
    }

    /// Compile and execute; compile errors return before anything runs
    pub async fn run(
        &self,
        graph: &Graph,
        initial_inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<RunResults> {
        let plan = self.compile(graph)?;
        self.execute(&plan, initial_inputs, ctx).await
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.scheduler.cache().map(|c| c.stats())
    }

    pub async fn clear_cache(&self) {
        if let Some(cache) = self.scheduler.cache() {
            cache.clear().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, EngineError};
    use crate::manifest::{Manifest, NodeCategory, Port};
    use crate::types::{DataType, NodeInstance, NodeOutputs};
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .register_callback(
                Manifest::new("label", "1.0.0", NodeCategory::Input)
                    .output(Port::optional("text", DataType::String))
                    .cacheable(),
                |_inputs, _config| async move {
                    Ok(NodeOutputs::from([("text".to_string(), json!("Q3"))]))
                },
            )
            .unwrap();
        registry
            .register_manifest(
                Manifest::new("total", "1.0.0", NodeCategory::Transform)
                    .input(Port::required("amount", DataType::Number)),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_run_rejects_mistyped_graph_before_execution() {
        let engine = Engine::local(registry());
        let graph = Graph::new("g")
            .node(NodeInstance::new("A", "label"))
            .node(NodeInstance::new("B", "total"))
            .connect("A", "text", "B", "amount");

        let err = engine
            .run(&graph, &NodeInputs::new(), &ExecutionContext::new("g"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Compile(CompileError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_wires_cache() {
        let engine = Engine::from_config(registry(), &EngineConfig::default()).unwrap();
        let graph = Graph::new("g").node(NodeInstance::new("A", "label"));

        for _ in 0..2 {
            let run = engine
                .run(&graph, &NodeInputs::new(), &ExecutionContext::new("g"))
                .await
                .unwrap();
            assert!(run.is_success());
        }
        let stats = engine.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.entries), (1, 1));

        engine.clear_cache().await;
        assert_eq!(engine.cache_stats().unwrap().entries, 0);
    }

    #[test]
    fn test_cache_can_be_disabled() {
        let mut config = EngineConfig::default();
        config.cache.enabled = false;
        let engine = Engine::from_config(registry(), &config).unwrap();
        assert!(engine.cache_stats().is_none());
    }

    #[test]
    fn test_remote_mode_uses_remote_backend() {
        let mut config = EngineConfig::default();
        config.mode = ExecutionMode::Remote;
        let engine = Engine::from_config(registry(), &config).unwrap();
        assert_eq!(engine.scheduler().backend().name(), "remote");
    }

    #[tokio::test]
    async fn test_metadata_only_type_fails_locally() {
        let engine = Engine::local(registry());
        let graph = Graph::new("g")
            .node(NodeInstance::new("B", "total"))
            .connect(crate::types::INITIAL_INPUTS_NODE, "amount", "B", "amount");
        let initial = NodeInputs::from([("amount".to_string(), json!(12.5))]);

        let run = engine
            .run(&graph, &initial, &ExecutionContext::new("g"))
            .await
            .unwrap();
        assert_eq!(
            run.get("B").unwrap().error_code(),
            Some(crate::error::ErrorCode::NotFound)
        );
    }
}
