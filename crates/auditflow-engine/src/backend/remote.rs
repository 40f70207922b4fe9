//! Remote task backend
//!
//! Each node becomes a task on an external service: submit once, then poll
//! its status on a timer until it completes, fails or the wall-clock timeout
//! passes. Polling is an explicit state machine so tests can drive it with a
//! paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use super::{Dispatch, ExecutionBackend, Invocation};
use crate::config::RemoteConfig;
use crate::context::ExecutionContext;
use crate::error::{NodeError, TransportError};
use crate::events::RunEvent;
use crate::types::{NodeConfig, NodeInputs, NodeOutputs};

/// Task submission body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub config: NodeConfig,
    pub inputs: NodeInputs,
}

/// Lifecycle status reported by the task service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Reply to a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTask {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
}

/// Reply to a status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub task_id: String,
    pub status: TaskStatus,
    /// Percent complete, 0-100
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Client for the remote task service
#[async_trait]
pub trait TaskClient: Send + Sync {
    async fn submit_task(&self, request: &TaskRequest) -> Result<SubmittedTask, TransportError>;

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, TransportError>;
}

/// Where a polled task stands
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Pending,
    Running { progress: Option<f32> },
    Completed(NodeOutputs),
    Failed(String),
    TimedOut,
}

impl PollState {
    /// Fold a status response into the state
    ///
    /// Terminal states absorb every further response.
    pub fn advance(self, response: TaskStatusResponse) -> PollState {
        if self.is_terminal() {
            return self;
        }
        match response.status {
            TaskStatus::Pending => PollState::Pending,
            TaskStatus::Running => PollState::Running {
                progress: response.progress,
            },
            TaskStatus::Completed => PollState::Completed(result_outputs(response.result)),
            TaskStatus::Failed => PollState::Failed(
                response
                    .error
                    .unwrap_or_else(|| "task failed without an error message".to_string()),
            ),
        }
    }

    /// Transition taken when the deadline passes
    pub fn expire(self) -> PollState {
        if self.is_terminal() {
            self
        } else {
            PollState::TimedOut
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Completed(_) | PollState::Failed(_) | PollState::TimedOut
        )
    }
}

/// An object result maps onto output ports; anything else lands on `result`
fn result_outputs(result: Option<Value>) -> NodeOutputs {
    match result {
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(Value::Null) | None => NodeOutputs::new(),
        Some(other) => NodeOutputs::from([("result".to_string(), other)]),
    }
}

/// Backend that executes nodes as remote tasks
///
/// Remote tasks are never retried. Transport errors while polling are
/// logged and polling continues until the timeout.
pub struct RemoteBackend {
    client: Arc<dyn TaskClient>,
    poll_interval: Duration,
    max_poll_interval: Duration,
    poll_backoff: f64,
    timeout: Duration,
}

impl RemoteBackend {
    pub fn new(client: Arc<dyn TaskClient>, config: &RemoteConfig) -> Self {
        Self {
            client,
            poll_interval: config.poll_interval(),
            max_poll_interval: config.max_poll_interval(),
            poll_backoff: config.poll_backoff(),
            timeout: config.timeout(),
        }
    }

    async fn run_task(
        &self,
        invocation: Invocation<'_>,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let request = TaskRequest {
            node_id: invocation.node_id.to_string(),
            node_type: invocation.manifest.node_type.clone(),
            config: invocation.config.clone(),
            inputs: invocation.inputs.clone(),
        };

        let started = Instant::now();
        let deadline = started + self.timeout;
        let submitted = self.client.submit_task(&request).await?;
        let task_id = submitted.task_id;

        log::debug!(
            "Node '{}' submitted as task {} (queue position {:?})",
            invocation.node_id,
            task_id,
            submitted.queue_position
        );
        ctx.emit(RunEvent::TaskSubmitted {
            execution_id: ctx.execution_id().to_string(),
            node_id: invocation.node_id.to_string(),
            task_id: task_id.clone(),
        });

        let mut state = PollState::Pending;
        let mut interval = self.poll_interval;

        loop {
            if Instant::now() >= deadline {
                state = state.expire();
            } else {
                match tokio::time::timeout_at(deadline, self.client.task_status(&task_id)).await {
                    Ok(Ok(response)) => {
                        state = state.advance(response);
                        if let PollState::Running {
                            progress: Some(progress),
                        } = &state
                        {
                            ctx.report_progress(*progress, None);
                        }
                    }
                    Ok(Err(e)) => {
                        log::warn!("Polling task {} failed: {}", task_id, e);
                    }
                    Err(_) => state = state.expire(),
                }
            }

            match state {
                PollState::Completed(outputs) => {
                    log::debug!("Task {} completed in {:?}", task_id, started.elapsed());
                    return Ok(outputs);
                }
                PollState::Failed(message) => {
                    return Err(NodeError::RemoteFailed { task_id, message });
                }
                PollState::TimedOut => {
                    return Err(NodeError::Timeout {
                        task_id,
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                PollState::Pending | PollState::Running { .. } => {}
            }

            let wake = Instant::now()
                .checked_add(interval)
                .map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = ctx.cancelled() => {
                    log::info!("Abandoning task {} after cancellation", task_id);
                    return Err(NodeError::Cancelled);
                }
            }
            interval = Duration::try_from_secs_f64(interval.as_secs_f64() * self.poll_backoff)
                .map_or(self.max_poll_interval, |next| next.min(self.max_poll_interval));
        }
    }
}

#[async_trait]
impl ExecutionBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn dispatch(&self, invocation: Invocation<'_>, ctx: &ExecutionContext) -> Dispatch {
        Dispatch::once(self.run_task(invocation, ctx).await)
    }
}
