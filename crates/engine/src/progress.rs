//! Progress reporting for a running execution.
//!
//! The scheduler calls a [`ProgressSink`] at workflow and node start/end.
//! Sinks are caller code: whatever they return, the run carries on.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::context::ExecutionContext;

/// A structured progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    WorkflowStarted {
        execution_id: Uuid,
        workflow_id: String,
        total_nodes: usize,
    },
    NodeStarted {
        node_id: String,
        agent_id: String,
    },
    NodeCompleted {
        node_id: String,
        tokens_in: u64,
        tokens_out: u64,
        cost: f64,
    },
    NodeFailed {
        node_id: String,
        /// `EngineError::category()` of the failure.
        category: &'static str,
        message: String,
    },
    WorkflowCompleted {
        execution_id: Uuid,
        completed_nodes: usize,
    },
    WorkflowFailed {
        execution_id: Uuid,
        message: String,
    },
}

impl ProgressEvent {
    /// Node the event is about, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Receiver of progress events.
///
/// `context` is a read-only view of the run as it stood when the event was
/// emitted. Errors are logged by the scheduler and otherwise ignored.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: &ProgressEvent, context: &ExecutionContext) -> anyhow::Result<()>;
}

/// Sink that forwards events over a tokio broadcast channel.
/// All subscribers receive all events.
pub struct ChannelProgressSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChannelProgressSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn notify(&self, event: &ProgressEvent, _context: &ExecutionContext) -> anyhow::Result<()> {
        // Ignore error if no receivers
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
