//! Node type registry
//!
//! Maps node type strings to their manifest and, for types that run
//! in-process, the runtime that executes them. A registry is an ordinary
//! value: build it during setup, then share it behind an `Arc` with the
//! compiler and scheduler. It is never mutated once a run starts.
//!
//! # Usage
//!
//! ```ignore
//! use auditflow_engine::{Registry, Manifest, NodeCategory};
//!
//! let mut registry = Registry::with_builtins();
//! registry.register_typed(MyDetector::default())?;
//! registry.register_manifest(Manifest::new("ocr", "1.0.0", NodeCategory::Input))?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::{NodeError, RegistryError};
use crate::manifest::{Capabilities, Manifest, NodeCategory};
use crate::types::{DataType, NodeConfig, NodeInputs, NodeOutputs};

/// Contract every in-process node implements
///
/// Inputs and config have already been validated against the manifest when
/// `execute` is called. Returned errors and panics are recorded as failed
/// results; they never abort the run.
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Manifest for this node type, read once at registration
    fn manifest(&self) -> Manifest;

    /// Execute the node with validated inputs and config
    async fn execute(
        &self,
        inputs: &NodeInputs,
        config: &NodeConfig,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError>;
}

/// A node whose config is deserialized into a typed struct before running
///
/// Register it with [`Registry::register_typed`]. A config that passes schema
/// validation but does not deserialize fails with `INVALID_CONFIG`.
#[async_trait]
pub trait TypedNode: Send + Sync + 'static {
    type Config: DeserializeOwned + Send;

    fn manifest(&self) -> Manifest;

    async fn run(
        &self,
        inputs: &NodeInputs,
        config: Self::Config,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError>;
}

/// Adapter exposing a [`TypedNode`] as a [`NodeRuntime`]
pub struct TypedRuntime<N>(pub N);

#[async_trait]
impl<N: TypedNode> NodeRuntime for TypedRuntime<N> {
    fn manifest(&self) -> Manifest {
        self.0.manifest()
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        config: &NodeConfig,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let typed: N::Config = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| NodeError::InvalidConfig(vec![e.to_string()]))?;
        self.0.run(inputs, typed, ctx).await
    }
}

type BoxedCallback = Box<
    dyn Fn(NodeInputs, NodeConfig) -> Pin<Box<dyn Future<Output = Result<NodeOutputs, NodeError>> + Send>>
        + Send
        + Sync,
>;

/// Async callback wrapped as a node runtime
pub struct CallbackRuntime {
    manifest: Manifest,
    callback: BoxedCallback,
}

impl CallbackRuntime {
    pub fn new<F, Fut>(manifest: Manifest, callback: F) -> Self
    where
        F: Fn(NodeInputs, NodeConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutputs, NodeError>> + Send + 'static,
    {
        Self {
            manifest,
            callback: Box::new(move |inputs, config| Box::pin(callback(inputs, config))),
        }
    }
}

#[async_trait]
impl NodeRuntime for CallbackRuntime {
    fn manifest(&self) -> Manifest {
        self.manifest.clone()
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        config: &NodeConfig,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        (self.callback)(inputs.clone(), config.clone()).await
    }
}

/// Constructor for a built-in node, collected at link time
///
/// ```ignore
/// inventory::submit!(auditflow_engine::BuiltinNode(|| {
///     std::sync::Arc::new(auditflow_engine::TypedRuntime(SumNode))
/// }));
/// ```
pub struct BuiltinNode(pub fn() -> Arc<dyn NodeRuntime>);

inventory::collect!(BuiltinNode);

struct RegistryEntry {
    manifest: Arc<Manifest>,
    runtime: Option<Arc<dyn NodeRuntime>>,
}

/// Counts describing the registered node types
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    /// Types with an in-process runtime
    pub executable: usize,
    pub by_category: BTreeMap<NodeCategory, usize>,
    pub cacheable: usize,
    pub parallel: usize,
    pub streaming: usize,
}

/// Registry of node types
pub struct Registry {
    entries: HashMap<String, RegistryEntry>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every node submitted via [`BuiltinNode`]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in inventory::iter::<BuiltinNode> {
            if let Err(e) = registry.register((builtin.0)()) {
                log::warn!("Skipping built-in node: {}", e);
            }
        }
        log::debug!("Registered {} built-in node types", registry.len());
        registry
    }

    /// Register an in-process node runtime
    pub fn register(&mut self, runtime: Arc<dyn NodeRuntime>) -> Result<(), RegistryError> {
        let manifest = runtime.manifest();
        self.insert(manifest, Some(runtime))
    }

    /// Register a node with a typed config
    pub fn register_typed<N: TypedNode>(&mut self, node: N) -> Result<(), RegistryError> {
        self.register(Arc::new(TypedRuntime(node)))
    }

    /// Register an async closure as a node runtime
    pub fn register_callback<F, Fut>(
        &mut self,
        manifest: Manifest,
        callback: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(NodeInputs, NodeConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutputs, NodeError>> + Send + 'static,
    {
        self.register(Arc::new(CallbackRuntime::new(manifest, callback)))
    }

    /// Register a manifest with no local runtime
    ///
    /// Such types compile and run on the remote backend only.
    pub fn register_manifest(&mut self, manifest: Manifest) -> Result<(), RegistryError> {
        self.insert(manifest, None)
    }

    fn insert(
        &mut self,
        manifest: Manifest,
        runtime: Option<Arc<dyn NodeRuntime>>,
    ) -> Result<(), RegistryError> {
        manifest
            .check()
            .map_err(|reason| RegistryError::InvalidManifest {
                node_type: manifest.node_type.clone(),
                reason,
            })?;
        if self.entries.contains_key(&manifest.node_type) {
            return Err(RegistryError::DuplicateType(manifest.node_type));
        }
        log::debug!(
            "Registered node type '{}' v{}",
            manifest.node_type,
            manifest.version
        );
        self.entries.insert(
            manifest.node_type.clone(),
            RegistryEntry {
                manifest: Arc::new(manifest),
                runtime,
            },
        );
        Ok(())
    }

    /// Manifest for a node type
    pub fn lookup(&self, node_type: &str) -> Result<Arc<Manifest>, RegistryError> {
        self.entries
            .get(node_type)
            .map(|e| e.manifest.clone())
            .ok_or_else(|| RegistryError::NotFound(node_type.to_string()))
    }

    /// In-process runtime for a node type, if it has one
    pub fn runtime(&self, node_type: &str) -> Option<Arc<dyn NodeRuntime>> {
        self.entries.get(node_type).and_then(|e| e.runtime.clone())
    }

    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// All registered type strings, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// All manifests, sorted by type
    pub fn manifests(&self) -> Vec<Arc<Manifest>> {
        let mut all: Vec<Arc<Manifest>> = self.entries.values().map(|e| e.manifest.clone()).collect();
        all.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        all
    }

    /// Manifests whose capabilities satisfy a predicate
    pub fn list_by_capability(&self, predicate: impl Fn(&Capabilities) -> bool) -> Vec<Arc<Manifest>> {
        self.manifests()
            .into_iter()
            .filter(|m| predicate(&m.capabilities))
            .collect()
    }

    /// Manifests grouped by category
    pub fn by_category(&self) -> BTreeMap<NodeCategory, Vec<Arc<Manifest>>> {
        let mut grouped: BTreeMap<NodeCategory, Vec<Arc<Manifest>>> = BTreeMap::new();
        for manifest in self.manifests() {
            grouped.entry(manifest.category).or_default().push(manifest);
        }
        grouped
    }

    /// Node types that can consume a value of the given type
    ///
    /// Exact port matches come before wildcard ports.
    pub fn recommend_next(&self, data_type: DataType) -> Vec<Arc<Manifest>> {
        let mut ranked: Vec<(bool, Arc<Manifest>)> = self
            .manifests()
            .into_iter()
            .filter_map(|m| {
                let exact = m
                    .inputs
                    .iter()
                    .any(|p| p.port_type.members().contains(&data_type));
                let wildcard = m.inputs.iter().any(|p| p.port_type.accepts(data_type));
                if exact || wildcard {
                    Some((!exact, m))
                } else {
                    None
                }
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.node_type.cmp(&b.1.node_type)));
        ranked.into_iter().map(|(_, m)| m).collect()
    }

    /// Case-insensitive search over type, label and description
    pub fn search(&self, query: &str) -> Vec<Arc<Manifest>> {
        let needle = query.trim().to_lowercase();
        self.manifests()
            .into_iter()
            .filter(|m| {
                needle.is_empty()
                    || m.node_type.to_lowercase().contains(&needle)
                    || m.label.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            let caps = &entry.manifest.capabilities;
            *stats.by_category.entry(entry.manifest.category).or_default() += 1;
            stats.executable += usize::from(entry.runtime.is_some());
            stats.cacheable += usize::from(caps.cacheable);
            stats.parallel += usize::from(caps.parallel);
            stats.streaming += usize::from(caps.streaming);
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Port;
    use serde::Deserialize;
    use serde_json::json;

    fn manifest(node_type: &str) -> Manifest {
        Manifest::new(node_type, "1.0.0", NodeCategory::Transform)
            .input(Port::optional("value", DataType::Number))
            .output(Port::optional("value", DataType::Number))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register_manifest(manifest("double")).unwrap();

        assert!(registry.has_node_type("double"));
        assert_eq!(registry.lookup("double").unwrap().version, "1.0.0");
        assert_eq!(
            registry.lookup("triple").unwrap_err(),
            RegistryError::NotFound("triple".into())
        );
        assert!(registry.runtime("double").is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = Registry::new();
        registry.register_manifest(manifest("double")).unwrap();
        let err = registry.register_manifest(manifest("double")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType("double".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_manifest_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register_manifest(Manifest::new("", "1.0.0", NodeCategory::Utility))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest { .. }));
    }

    #[test]
    fn test_list_by_capability_and_stats() {
        let mut registry = Registry::new();
        registry.register_manifest(manifest("a").parallel().cacheable()).unwrap();
        registry.register_manifest(manifest("b").parallel()).unwrap();
        registry
            .register_manifest(Manifest::new("c", "1.0.0", NodeCategory::Output))
            .unwrap();

        let parallel: Vec<String> = registry
            .list_by_capability(|c| c.parallel)
            .iter()
            .map(|m| m.node_type.clone())
            .collect();
        assert_eq!(parallel, vec!["a", "b"]);

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.executable, 0);
        assert_eq!(stats.parallel, 2);
        assert_eq!(stats.cacheable, 1);
        assert_eq!(stats.by_category[&NodeCategory::Transform], 2);
        assert_eq!(registry.by_category()[&NodeCategory::Output].len(), 1);
    }

    #[test]
    fn test_recommend_next_ranks_exact_matches_first() {
        let mut registry = Registry::new();
        registry
            .register_manifest(
                Manifest::new("sink", "1", NodeCategory::Output).input(Port::required("value", DataType::Any)),
            )
            .unwrap();
        registry
            .register_manifest(
                Manifest::new("journal-check", "1", NodeCategory::Audit)
                    .input(Port::required("ledger", DataType::Ledger)),
            )
            .unwrap();
        registry
            .register_manifest(
                Manifest::new("invoice-match", "1", NodeCategory::Audit)
                    .input(Port::required("invoices", DataType::Invoices)),
            )
            .unwrap();

        let next: Vec<String> = registry
            .recommend_next(DataType::Ledger)
            .iter()
            .map(|m| m.node_type.clone())
            .collect();
        assert_eq!(next, vec!["journal-check", "sink"]);
    }

    #[test]
    fn test_search() {
        let mut registry = Registry::new();
        registry
            .register_manifest(manifest("bank-import").description("Imports bank statements"))
            .unwrap();
        registry.register_manifest(manifest("sum")).unwrap();
        assert_eq!(registry.search("STATEMENT").len(), 1);
        assert_eq!(registry.search("").len(), 2);
    }

    #[tokio::test]
    async fn test_callback_runtime() {
        let mut registry = Registry::new();
        registry
            .register_callback(manifest("double"), |inputs, _config| async move {
                let v = inputs.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
                Ok(NodeOutputs::from([("value".to_string(), json!(v * 2.0))]))
            })
            .unwrap();

        let runtime = registry.runtime("double").unwrap();
        let inputs = NodeInputs::from([("value".to_string(), json!(21))]);
        let out = runtime
            .execute(&inputs, &NodeConfig::new(), &ExecutionContext::new("g"))
            .await
            .unwrap();
        assert_eq!(out["value"], json!(42.0));
    }

    #[derive(Deserialize)]
    struct ScaleConfig {
        factor: f64,
    }

    struct Scale;

    #[async_trait]
    impl TypedNode for Scale {
        type Config = ScaleConfig;

        fn manifest(&self) -> Manifest {
            manifest("scale")
        }

        async fn run(
            &self,
            inputs: &NodeInputs,
            config: ScaleConfig,
            _ctx: &ExecutionContext,
        ) -> Result<NodeOutputs, NodeError> {
            let v = inputs.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
            Ok(NodeOutputs::from([("value".to_string(), json!(v * config.factor))]))
        }
    }

    #[tokio::test]
    async fn test_typed_node_config_conversion() {
        let runtime = TypedRuntime(Scale);
        let ctx = ExecutionContext::new("g");
        let inputs = NodeInputs::from([("value".to_string(), json!(2))]);

        let mut config = NodeConfig::new();
        config.insert("factor".into(), json!(1.5));
        let out = runtime.execute(&inputs, &config, &ctx).await.unwrap();
        assert_eq!(out["value"], json!(3.0));

        config.insert("factor".into(), json!("big"));
        let err = runtime.execute(&inputs, &config, &ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }
}
