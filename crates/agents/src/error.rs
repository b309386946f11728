//! Agent-level error type.

use thiserror::Error;

/// Errors returned by an [`AgentRunner`](crate::AgentRunner) when it could
/// not produce an [`AgentResult`](crate::AgentResult) at all.
///
/// An agent that ran but reported a failure returns `Ok` with
/// [`AgentStatus::Error`](crate::AgentStatus::Error) instead.
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    /// The execution backend itself failed (transport, provider, …).
    #[error("agent backend error: {0}")]
    Backend(String),

    /// The request was rejected before the agent started.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),
}
