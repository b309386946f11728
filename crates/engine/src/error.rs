//! Engine-level error types.

use thiserror::Error;

use crate::context::ExecutionContext;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // ------ Validation errors ------

    /// The graph declares no nodes.
    #[error("graph has no nodes")]
    EmptyGraph,

    /// Two or more nodes share an ID. Every duplicated ID is listed once.
    #[error("duplicate node identifiers: {}", .0.join(", "))]
    DuplicateNodeIds(Vec<String>),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references a non-existent node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// An edge points from a node to itself.
    #[error("self-loop on node '{0}'")]
    SelfLoop(String),

    /// Topological sort detected a cycle; `node_id` lies on it.
    #[error("graph contains a cycle through node '{node_id}'")]
    CycleDetected { node_id: String },

    /// The nodes form more than one weakly-connected component.
    #[error("graph is disconnected: unreachable node(s) {}", .isolated.join(", "))]
    Disconnected { isolated: Vec<String> },

    // ------ Execution errors ------

    /// A node references an agent the lookup doesn't know.
    #[error("referenced agent not found: node '{node_id}' uses agent '{agent_id}'")]
    AgentNotFound { node_id: String, agent_id: String },

    /// A node's agent call exceeded its configured timeout.
    #[error("node '{node_id}' timed out after {timeout_secs}s")]
    NodeTimeout { node_id: String, timeout_secs: u64 },

    /// A node's agent call reported a failure.
    #[error("node '{node_id}' execution failed: {message}")]
    NodeExecutionFailed { node_id: String, message: String },

    /// No node could be dispatched although some never ran.
    #[error("execution stalled with pending node(s) {}", .pending.join(", "))]
    Stalled { pending: Vec<String> },
}

impl EngineError {
    /// Stable, machine-checkable name of the failure category.
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyGraph => "empty_graph",
            Self::DuplicateNodeIds(_) => "duplicate_node_ids",
            Self::UnknownNodeReference { .. } => "unknown_node_reference",
            Self::SelfLoop(_) => "self_loop",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::Disconnected { .. } => "disconnected",
            Self::AgentNotFound { .. } => "agent_not_found",
            Self::NodeTimeout { .. } => "node_timeout",
            Self::NodeExecutionFailed { .. } => "node_execution_failed",
            Self::Stalled { .. } => "stalled",
        }
    }

    /// The single node an error is about, when there is one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::UnknownNodeReference { node_id, .. }
            | Self::CycleDetected { node_id }
            | Self::AgentNotFound { node_id, .. }
            | Self::NodeTimeout { node_id, .. }
            | Self::NodeExecutionFailed { node_id, .. } => Some(node_id),
            Self::SelfLoop(node_id) => Some(node_id),
            Self::EmptyGraph
            | Self::DuplicateNodeIds(_)
            | Self::Disconnected { .. }
            | Self::Stalled { .. } => None,
        }
    }

    /// `true` for pre-flight graph-shape failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyGraph
                | Self::DuplicateNodeIds(_)
                | Self::UnknownNodeReference { .. }
                | Self::SelfLoop(_)
                | Self::CycleDetected { .. }
                | Self::Disconnected { .. }
        )
    }
}

/// A run that ended in failure, together with the progress it had made.
///
/// `context` holds every result recorded before the failure was observed;
/// its status is [`RunStatus::Aborted`](crate::context::RunStatus::Aborted).
#[derive(Debug, Error)]
#[error("execution {} aborted: {error}", .context.execution_id)]
pub struct ExecutionFailure {
    #[source]
    pub error: EngineError,
    pub context: Box<ExecutionContext>,
}

impl ExecutionFailure {
    pub fn node_id(&self) -> Option<&str> {
        self.error.node_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_nodes() {
        let err = EngineError::DuplicateNodeIds(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "duplicate node identifiers: a, b");

        let err = EngineError::Disconnected {
            isolated: vec!["x".into()],
        };
        assert!(err.to_string().starts_with("graph is disconnected"));
        assert_eq!(err.category(), "disconnected");
        assert!(err.is_validation());
        assert_eq!(err.node_id(), None);
    }

    #[test]
    fn execution_errors_carry_their_node() {
        let err = EngineError::NodeTimeout {
            node_id: "slow".into(),
            timeout_secs: 1,
        };
        assert_eq!(err.node_id(), Some("slow"));
        assert_eq!(err.category(), "node_timeout");
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "node 'slow' timed out after 1s");
    }
}
