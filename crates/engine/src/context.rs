//! `ExecutionContext` — the record of one scheduler run.

use std::collections::{BTreeMap, BTreeSet};

use agents::{AgentResult, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dag::ValidatedGraph;

/// Lifecycle of a single node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// Lifecycle of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Aborted,
}

/// Everything one execution of a workflow graph produced.
///
/// Owned by the scheduler while the run is in progress; progress sinks only
/// ever see it by shared reference. Downstream consumers (reports, billing,
/// session history) receive it once the run has ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, when every node has completed.
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub completed_nodes: BTreeSet<String>,
    /// Order in which nodes reached `Completed`.
    pub completion_order: Vec<String>,
    pub node_states: BTreeMap<String, NodeState>,
    pub node_results: BTreeMap<String, AgentResult>,
    pub cumulative_tokens: TokenUsage,
    pub history_session_id: Option<String>,
}

impl ExecutionContext {
    /// Fresh context for `graph` with every node `Pending`.
    pub fn new(graph: &ValidatedGraph, history_session_id: Option<String>) -> Self {
        let node_states = graph
            .graph()
            .nodes
            .iter()
            .map(|n| (n.node_id.clone(), NodeState::Pending))
            .collect();

        Self {
            execution_id: Uuid::new_v4(),
            workflow_id: graph.graph().workflow_id.clone(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            completed_nodes: BTreeSet::new(),
            completion_order: Vec::new(),
            node_states,
            node_results: BTreeMap::new(),
            cumulative_tokens: TokenUsage::default(),
            history_session_id,
        }
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.node_states.get(node_id).copied()
    }

    pub fn is_completed(&self, node_id: &str) -> bool {
        self.completed_nodes.contains(node_id)
    }

    /// Recorded answer of a node, if it finished.
    pub fn answer(&self, node_id: &str) -> Option<&str> {
        self.node_results.get(node_id).map(|r| r.answer.as_str())
    }

    pub(crate) fn set_state(&mut self, node_id: &str, state: NodeState) {
        if let Some(slot) = self.node_states.get_mut(node_id) {
            *slot = state;
        }
    }

    /// Record a node's result. The first write for a node wins.
    pub(crate) fn record_result(&mut self, node_id: &str, result: AgentResult) {
        self.node_results
            .entry(node_id.to_owned())
            .or_insert(result);
    }

    /// Mark a node completed and fold its usage into the running total.
    pub(crate) fn mark_completed(&mut self, node_id: &str) {
        if self.completed_nodes.insert(node_id.to_owned()) {
            self.completion_order.push(node_id.to_owned());
            if let Some(result) = self.node_results.get(node_id) {
                self.cumulative_tokens += result.usage();
            }
        }
        self.set_state(node_id, NodeState::Completed);
    }

    pub(crate) fn finish(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self.status = RunStatus::Succeeded;
    }

    pub(crate) fn abort(&mut self) {
        self.status = RunStatus::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, Node, WorkflowGraph};

    fn chain() -> ValidatedGraph {
        ValidatedGraph::new(WorkflowGraph::new(
            "wf",
            vec![Node::new("a", "x"), Node::new("b", "x")],
            vec![Edge::new("a", "b")],
        ))
        .unwrap()
    }

    #[test]
    fn new_context_starts_pending() {
        let ctx = ExecutionContext::new(&chain(), Some("session-1".into()));
        assert_eq!(ctx.workflow_id, "wf");
        assert_eq!(ctx.status, RunStatus::Running);
        assert_eq!(ctx.node_state("a"), Some(NodeState::Pending));
        assert_eq!(ctx.history_session_id.as_deref(), Some("session-1"));
        assert!(ctx.completed_at.is_none());
    }

    #[test]
    fn completion_is_recorded_once_and_usage_accumulates() {
        let mut ctx = ExecutionContext::new(&chain(), None);

        ctx.record_result("a", AgentResult::completed("first").with_usage(3, 4, 0.5));
        ctx.record_result("a", AgentResult::completed("second"));
        ctx.mark_completed("a");
        ctx.mark_completed("a");

        assert_eq!(ctx.answer("a"), Some("first"));
        assert_eq!(ctx.completion_order, vec!["a"]);
        assert_eq!(ctx.cumulative_tokens.total_tokens(), 7);
        assert!(ctx.is_completed("a"));
        assert!(ctx.node_state("a").unwrap().is_terminal());

        ctx.record_result("b", AgentResult::completed("done").with_usage(1, 1, 0.25));
        ctx.mark_completed("b");
        ctx.finish();
        let first_completed_at = ctx.completed_at;
        ctx.finish();

        assert_eq!(ctx.completed_at, first_completed_at);
        assert_eq!(ctx.status, RunStatus::Succeeded);
        assert_eq!(ctx.cumulative_tokens.tokens_in, 4);
        assert!((ctx.cumulative_tokens.cost - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn context_serializes_for_downstream_consumers() {
        let mut ctx = ExecutionContext::new(&chain(), None);
        ctx.set_state("a", NodeState::TimedOut);
        ctx.abort();

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["node_states"]["a"], "timed_out");
        assert_eq!(json["workflow_id"], "wf");
    }
}
