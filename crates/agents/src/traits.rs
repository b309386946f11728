//! The collaborator contracts the workflow engine consumes.
//!
//! `AgentLookup` resolves an agent id to its configuration and `AgentRunner`
//! runs one step of work with that agent. Both live here (outside the engine
//! crate) so agent backends can implement them without depending on the
//! scheduler.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AgentError;

// ---------------------------------------------------------------------------
// Agent configuration
// ---------------------------------------------------------------------------

/// Configuration of a single agent, as returned by an [`AgentLookup`].
///
/// The engine treats everything except `agent_id` as opaque and hands it
/// unchanged to the [`AgentRunner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    #[serde(default)]
    pub name: String,
    /// Backend-specific settings (model, system prompt, tools, …).
    #[serde(default)]
    pub settings: Value,
}

impl AgentConfig {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            settings: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// Everything an agent needs to run one workflow step.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub agent: AgentConfig,
    /// Instruction text for this step.
    pub task: String,
    /// Labelled outputs of upstream steps, keyed by branch name or node id.
    pub context: BTreeMap<String, String>,
    /// Workflow node this request belongs to.
    pub node_id: String,
    /// Execution run this request belongs to.
    pub execution_id: String,
    /// Correlation id for the caller's history/logging backend.
    pub session_id: Option<String>,
    /// Caller-supplied values, passed through untouched.
    pub caller_context: Map<String, Value>,
}

/// Outcome reported by the agent itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    Error,
}

/// The result of one agent call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: AgentStatus,
    /// Natural-language answer produced by the agent.
    #[serde(default)]
    pub answer: String,
    /// Agent-reported error message when `status` is `Error`.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub cost: f64,
    /// Any further backend-specific fields (tool calls, iterations, …).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentResult {
    /// A successful result with the given answer and no usage figures.
    pub fn completed(answer: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Completed,
            answer: answer.into(),
            error: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            metadata: Map::new(),
        }
    }

    /// A failed result carrying the agent's error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Error,
            answer: String::new(),
            error: Some(error.into()),
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            metadata: Map::new(),
        }
    }

    /// Attach usage figures.
    pub fn with_usage(mut self, tokens_in: u64, tokens_out: u64, cost: f64) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self.cost = cost;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
            cost: self.cost,
        }
    }
}

// ---------------------------------------------------------------------------
// Usage accounting
// ---------------------------------------------------------------------------

/// Aggregate resource usage across one or more agent calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in.saturating_add(self.tokens_out)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.tokens_in = self.tokens_in.saturating_add(rhs.tokens_in);
        self.tokens_out = self.tokens_out.saturating_add(rhs.tokens_out);
        self.cost += rhs.cost;
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Keyed store of agent definitions.
///
/// Lookups are synchronous: the scheduler resolves the agent before it
/// spawns the node task, so a missing agent aborts the run without any
/// agent call being made.
pub trait AgentLookup: Send + Sync {
    fn get_agent(&self, agent_id: &str) -> Option<AgentConfig>;
}

/// Backend that runs one step of work with an agent.
///
/// Implementations must be safe to call concurrently from many nodes.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentResult, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total += AgentResult::completed("a").with_usage(10, 5, 0.25).usage();
        total += AgentResult::completed("b").with_usage(1, 2, 0.5).usage();
        assert_eq!(total.tokens_in, 11);
        assert_eq!(total.tokens_out, 7);
        assert_eq!(total.total_tokens(), 18);
        assert!((total.cost - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn result_deserializes_with_defaults() {
        let result: AgentResult =
            serde_json::from_str(r#"{ "status": "error", "error": "boom" }"#).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.answer, "");
        assert_eq!(result.usage(), TokenUsage::default());
    }
}
