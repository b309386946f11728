//! Core domain models for the workflow engine.
//!
//! These types describe what a workflow graph looks like in memory. They
//! deserialize from the `nodes` / `edges` document the surrounding service
//! stores; the engine imposes no file format of its own.

use serde::{Deserialize, Serialize};

/// Timeout applied to a node whose definition omits one.
pub const DEFAULT_NODE_TIMEOUT_SECS: u64 = 300;

fn default_timeout() -> u64 {
    DEFAULT_NODE_TIMEOUT_SECS
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph, bound to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by edges).
    pub node_id: String,
    /// Resolved through the agent lookup at execution time.
    pub agent_id: String,
    /// Maximum wall-clock seconds allowed for this node's agent call.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Key under which this node's answer is exposed to a convergence node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    /// Fixed instruction that replaces the forwarded or synthesis task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl Node {
    /// Node with the default timeout and no branch name or fixed task.
    pub fn new(node_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            agent_id: agent_id.into(),
            timeout: DEFAULT_NODE_TIMEOUT_SECS,
            branch_name: None,
            task: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = timeout_secs;
        self
    }

    pub fn with_branch(mut self, branch_name: impl Into<String>) -> Self {
        self.branch_name = Some(branch_name.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Label used for this node's output in a convergence context.
    pub fn branch_key(&self) -> &str {
        self.branch_name.as_deref().unwrap_or(&self.node_id)
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed dependency: `to` consumes the output of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub workflow_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Convenience constructor for testing.
    pub fn new(workflow_id: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            name: String::new(),
            description: String::new(),
            nodes,
            edges,
        }
    }

    pub fn get_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}
