//! Run events
//!
//! The scheduler and backends report progress through an [`EventSink`].
//! Events are observational only: a sink that fails to deliver never affects
//! the run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ErrorCode;

/// Receiver of run events
pub trait EventSink: Send + Sync {
    /// Deliver an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: RunEvent) -> Result<(), EventError>;
}

/// Failure delivering an event
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while a graph runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        execution_id: String,
        graph_id: String,
        total_phases: usize,
    },

    #[serde(rename_all = "camelCase")]
    PhaseStarted {
        execution_id: String,
        phase: usize,
        node_ids: Vec<String>,
        parallel: bool,
    },

    #[serde(rename_all = "camelCase")]
    PhaseCompleted {
        execution_id: String,
        phase: usize,
        failed: usize,
    },

    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: String,
        node_id: String,
        node_type: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        node_id: String,
        cached: bool,
        duration_ms: u64,
    },

    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: String,
        node_id: String,
        code: ErrorCode,
        message: String,
    },

    /// A local attempt failed and another one is scheduled
    #[serde(rename_all = "camelCase")]
    NodeRetrying {
        execution_id: String,
        node_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// Progress of a node, in percent
    #[serde(rename_all = "camelCase")]
    NodeProgress {
        execution_id: String,
        node_id: String,
        progress: f32,
        message: Option<String>,
    },

    /// A node was handed to the remote task service
    #[serde(rename_all = "camelCase")]
    TaskSubmitted {
        execution_id: String,
        node_id: String,
        task_id: String,
    },

    #[serde(rename_all = "camelCase")]
    RunCompleted {
        execution_id: String,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },

    /// Cancellation was observed before the given phase started
    #[serde(rename_all = "camelCase")]
    RunCancelled {
        execution_id: String,
        completed_phases: usize,
    },

    /// Stop-on-error ended the run before the given phase started
    #[serde(rename_all = "camelCase")]
    RunStopped {
        execution_id: String,
        completed_phases: usize,
        failed: Vec<String>,
    },
}

/// A sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: RunEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A sink that collects events in memory
///
/// Useful for tests that assert on emitted events.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<RunEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: RunEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// A sink forwarding events into a tokio channel
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: RunEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(p: f32) -> RunEvent {
        RunEvent::NodeProgress {
            execution_id: "exec1".into(),
            node_id: "ocr".into(),
            progress: p,
            message: None,
        }
    }

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        sink.send(progress(50.0)).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RunEvent::NodeProgress { node_id, progress, .. } => {
                assert_eq!(node_id, "ocr");
                assert_eq!(*progress, 50.0);
            }
            other => panic!("Expected NodeProgress event, got {:?}", other),
        }

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(progress(10.0)).unwrap();
        assert_eq!(json["type"], "nodeProgress");
        assert_eq!(json["executionId"], "exec1");
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_channel() {
        let (sink, mut rx) = ChannelEventSink::channel();
        sink.send(progress(1.0)).unwrap();
        assert_eq!(rx.recv().await, Some(progress(1.0)));

        drop(rx);
        assert!(sink.send(progress(2.0)).is_err());
    }
}
