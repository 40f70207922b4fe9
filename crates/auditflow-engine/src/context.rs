//! Execution context handed to every node
//!
//! A context is created once per run and narrowed to a node with
//! [`ExecutionContext::for_node`]. It carries ids for tracing, the event
//! sink, a cancellation token, and a typed service map through which hosts
//! inject collaborators (AI clients, storage handles, ...) that the engine
//! passes along without inspecting.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::events::{EventSink, NullEventSink, RunEvent};

/// Typed map of host-provided collaborators, keyed by type
#[derive(Default)]
pub struct Services {
    inner: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.inner.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Builder-style insert
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Per-run (and, once narrowed, per-node) execution context
#[derive(Clone)]
pub struct ExecutionContext {
    execution_id: String,
    graph_id: String,
    node_id: Option<String>,
    user_id: Option<String>,
    services: Arc<Services>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// Create a context for a new run of the given graph
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            node_id: None,
            user_id: None,
            services: Arc::new(Services::new()),
            events: Arc::new(NullEventSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = Arc::new(services);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Narrow this context to a single node
    pub fn for_node(&self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..self.clone()
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Node this context was narrowed to, empty at run level
    pub fn node_id(&self) -> &str {
        self.node_id.as_deref().unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Look up a host-provided collaborator
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.services.get::<T>()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Emit an event; delivery failures are logged and otherwise ignored
    pub fn emit(&self, event: RunEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("Dropped run event for {}: {}", self.execution_id, e);
        }
    }

    /// Report progress (0-100) for the node this context is narrowed to
    pub fn report_progress(&self, progress: f32, message: Option<String>) {
        self.emit(RunEvent::NodeProgress {
            execution_id: self.execution_id.clone(),
            node_id: self.node_id().to_string(),
            progress: progress.clamp(0.0, 100.0),
            message,
        });
    }

    /// Request cancellation of the run
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Future that resolves once the run is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Logger prefixed with this context's execution and node ids
    pub fn logger(&self) -> NodeLogger<'_> {
        NodeLogger { ctx: self }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("graph_id", &self.graph_id)
            .field("node_id", &self.node_id)
            .field("user_id", &self.user_id)
            .field("services", &self.services.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Thin wrapper over the `log` facade for node bodies
pub struct NodeLogger<'a> {
    ctx: &'a ExecutionContext,
}

impl NodeLogger<'_> {
    pub fn debug(&self, msg: impl std::fmt::Display) {
        log::debug!("[{}/{}] {}", self.ctx.execution_id, self.ctx.node_id(), msg);
    }

    pub fn info(&self, msg: impl std::fmt::Display) {
        log::info!("[{}/{}] {}", self.ctx.execution_id, self.ctx.node_id(), msg);
    }

    pub fn warn(&self, msg: impl std::fmt::Display) {
        log::warn!("[{}/{}] {}", self.ctx.execution_id, self.ctx.node_id(), msg);
    }

    pub fn error(&self, msg: impl std::fmt::Display) {
        log::error!("[{}/{}] {}", self.ctx.execution_id, self.ctx.node_id(), msg);
    }
}
