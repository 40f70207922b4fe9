//! AuditFlow Engine - typed node-graph execution for audit pipelines
//!
//! Users wire data-import, transform, audit-detection and output nodes into
//! a graph. The engine:
//!
//! - Type-checks every connection against the node manifests
//! - Compiles the graph into dependency-ordered phases, flagging the ones
//!   that may run in parallel
//! - Runs the phases with result caching and bounded retry, either
//!   in-process or on a remote task service
//!
//! # Architecture
//!
//! - `Registry`: node manifests and runtimes, keyed by type
//! - `Compiler`: graph to `ExecutionPlan`
//! - `Scheduler`: phase loop over an `ExecutionBackend`
//! - `ResultCache`: memoized outputs keyed by (type, inputs, config)
//! - `EventSink`: progress stream, independent of any transport
//!
//! # Example
//!
//! ```ignore
//! use auditflow_engine::{Engine, ExecutionContext, Graph, NodeInputs, Registry};
//!
//! let engine = Engine::local(Arc::new(Registry::with_builtins()));
//! let run = engine.run(&graph, &NodeInputs::new(), &ExecutionContext::new(&graph.id)).await?;
//! println!("{}", run.summary);
//! ```

pub mod backend;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod manifest;
pub mod plan;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod validation;

// Re-export key types
pub use backend::{ExecutionBackend, HttpTaskClient, LocalBackend, RemoteBackend, TaskClient};
pub use cache::{CacheKey, CacheStats, InMemoryCache, ResultCache};
pub use compiler::{CompileReport, CompileWarning, Compiler};
pub use config::{ConfigError, EngineConfig, ExecutionMode};
pub use context::{ExecutionContext, Services};
pub use engine::Engine;
pub use error::{CompileError, EngineError, ErrorCode, NodeError, RegistryError, Result};
pub use events::{ChannelEventSink, EventSink, NullEventSink, RunEvent, VecEventSink};
pub use manifest::{Capabilities, ConfigField, FieldKind, Manifest, NodeCategory, Port};
pub use plan::{ExecutionPlan, Phase, PlanSummary};
pub use registry::{BuiltinNode, NodeRuntime, Registry, RegistryStats, TypedNode, TypedRuntime};
pub use scheduler::{ExecutionResult, RunResults, Scheduler};
pub use types::{
    Connection, DataType, Endpoint, Graph, NodeConfig, NodeId, NodeInputs, NodeInstance,
    NodeOutputs, PortType, INITIAL_INPUTS_NODE,
};
