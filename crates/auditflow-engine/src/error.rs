//! Error types for the audit flow engine
//!
//! Errors come in two tiers. Registry and compile errors are fatal and are
//! returned before anything runs. Node errors are isolated per node and end
//! up as failed entries in the run's results map, tagged with an
//! [`ErrorCode`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::types::Connection;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The remote task client could not be set up
    #[error("Task service client error: {0}")]
    Transport(#[from] TransportError),

    /// A plan references a node that has no compiled step
    #[error("Plan is missing a step for node '{0}'")]
    MissingStep(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while registering or looking up node types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Node type '{0}' is already registered")]
    DuplicateType(String),

    #[error("Invalid manifest for '{node_type}': {reason}")]
    InvalidManifest { node_type: String, reason: String },

    #[error("Node type '{0}' is not registered")]
    NotFound(String),
}

/// Errors raised while compiling a graph into an execution plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Type mismatch on {connection}: {source_type} cannot feed {target_type}")]
    TypeMismatch {
        connection: Connection,
        source_type: String,
        target_type: String,
    },

    #[error("Cycle detected through nodes [{}]", node_ids.join(" -> "))]
    CycleDetected { node_ids: Vec<String> },

    #[error("Connection {connection} references unknown node '{node_id}'")]
    UnknownNode {
        connection: Connection,
        node_id: String,
    },

    #[error("Node '{node_id}' uses unregistered type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Node '{node_id}' has no {direction} port '{port}'")]
    UnknownPort {
        node_id: String,
        port: String,
        direction: PortDirection,
    },

    #[error("Node id '{0}' appears more than once")]
    DuplicateNodeId(String),

    /// A node uses the id reserved for the run's initial inputs
    #[error("Node id '{0}' is reserved for initial inputs")]
    ReservedNodeId(String),

    #[error("Input '{node_id}.{port}' is fed by more than one connection")]
    AmbiguousInput { node_id: String, port: String },
}

/// Which side of a node a port lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Per-node failure code recorded in an execution result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInputs,
    InvalidConfig,
    ExecutionError,
    Timeout,
    NotFound,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInputs => "INVALID_INPUTS",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while running a single node
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// Required inputs missing or of the wrong type
    #[error("Invalid inputs: {}", .0.join("; "))]
    InvalidInputs(Vec<String>),

    /// Config does not satisfy the manifest's schema
    #[error("Invalid config: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// The node body returned values its manifest does not declare
    #[error("Invalid outputs: {}", .0.join("; "))]
    InvalidOutputs(Vec<String>),

    /// The node body reported a failure
    #[error("Node execution failed: {message}")]
    Failed {
        message: String,
        details: Option<String>,
    },

    /// The node body panicked; `details` holds the panic location and,
    /// when `RUST_BACKTRACE` is set, the captured stack
    #[error("Node panicked: {message}")]
    Panicked {
        message: String,
        details: Option<String>,
    },

    /// No local runtime is registered for the node type
    #[error("No runtime registered for node type '{0}'")]
    RuntimeNotFound(String),

    /// A remote task reported failure
    #[error("Remote task {task_id} failed: {message}")]
    RemoteFailed { task_id: String, message: String },

    /// A remote task did not finish in time
    #[error("Task {task_id} timed out after {timeout_ms}ms")]
    Timeout { task_id: String, timeout_ms: u64 },

    /// Submitting a remote task failed
    #[error("Failed to submit task: {0}")]
    Submit(#[from] TransportError),

    /// The run was cancelled while this node was in flight
    #[error("Execution cancelled")]
    Cancelled,
}

impl NodeError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed {
            message: msg.into(),
            details: None,
        }
    }

    /// Create an execution failed error carrying extra diagnostics
    pub fn failed_with_details(msg: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Failed {
            message: msg.into(),
            details: Some(details.into()),
        }
    }

    /// Failure code recorded in the results map
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::InvalidInputs(_) => ErrorCode::InvalidInputs,
            NodeError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            NodeError::InvalidOutputs(_)
            | NodeError::Failed { .. }
            | NodeError::Panicked { .. }
            | NodeError::RemoteFailed { .. }
            | NodeError::Submit(_) => ErrorCode::ExecutionError,
            NodeError::RuntimeNotFound(_) => ErrorCode::NotFound,
            NodeError::Timeout { .. } => ErrorCode::Timeout,
            NodeError::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Validation failures are deterministic and never retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeError::Failed { .. } | NodeError::Panicked { .. }
        )
    }

    pub(crate) fn details(&self) -> Option<String> {
        match self {
            NodeError::Failed { details, .. } | NodeError::Panicked { details, .. } => {
                details.clone()
            }
            NodeError::RemoteFailed { task_id, .. } | NodeError::Timeout { task_id, .. } => {
                Some(format!("taskId={}", task_id))
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::failed_with_details(format!("Serialization error: {}", err), format!("{:?}", err))
    }
}

/// Failure talking to the remote task service
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Task service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}
