//! Execution backends
//!
//! A backend takes one validated node invocation and produces its outputs.
//! The scheduler is agnostic to where the work happens:
//!
//! - [`LocalBackend`] runs the registered runtime in-process, with retry
//! - [`RemoteBackend`] submits the node to a task service and polls it

mod http;
mod local;
mod remote;

pub use http::HttpTaskClient;
pub use local::LocalBackend;
pub use remote::{
    PollState, RemoteBackend, SubmittedTask, TaskClient, TaskRequest, TaskStatus,
    TaskStatusResponse,
};

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::manifest::Manifest;
use crate::types::{NodeConfig, NodeInputs, NodeOutputs};

/// A single node invocation handed to a backend
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub node_id: &'a str,
    pub manifest: &'a Manifest,
    pub inputs: &'a NodeInputs,
    pub config: &'a NodeConfig,
}

/// What a backend reports back for one invocation
#[derive(Debug)]
pub struct Dispatch {
    pub result: Result<NodeOutputs, NodeError>,
    /// Number of times the node body was invoked
    pub attempts: u32,
}

impl Dispatch {
    pub fn once(result: Result<NodeOutputs, NodeError>) -> Self {
        Self {
            result,
            attempts: 1,
        }
    }
}

/// Where node bodies execute
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run one node to completion
    ///
    /// Errors are reported inside [`Dispatch::result`]; a backend never
    /// panics on behalf of a node.
    async fn dispatch(&self, invocation: Invocation<'_>, ctx: &ExecutionContext) -> Dispatch;
}
