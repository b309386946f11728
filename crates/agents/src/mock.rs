//! `MockAgentRunner` — a test double for `AgentRunner`.
//!
//! Useful in unit and integration tests where a real agent backend is
//! either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{AgentError, AgentRequest, AgentResult, AgentRunner};

/// Behaviour scripted for one agent id.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Answer `"<agent_id>: <task>"`.
    Echo,
    /// Return this result as-is.
    Respond(AgentResult),
    /// Fail at the backend level (the runner returns `Err`).
    BackendError(String),
    /// Sleep, then behave like the inner behaviour.
    Delayed(Duration, Box<MockBehaviour>),
    /// Never return.
    Hang,
}

/// A mock runner that records every request it receives and answers
/// according to per-agent scripted behaviour.
///
/// Agents without a script behave like [`MockBehaviour::Echo`].
#[derive(Debug, Default)]
pub struct MockAgentRunner {
    behaviours: HashMap<String, MockBehaviour>,
    /// All requests seen by this runner (in call order).
    pub calls: Arc<Mutex<Vec<AgentRequest>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an arbitrary behaviour for `agent_id`.
    pub fn with(mut self, agent_id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.behaviours.insert(agent_id.into(), behaviour);
        self
    }

    /// `agent_id` always succeeds with `answer`.
    pub fn answering(self, agent_id: impl Into<String>, answer: impl Into<String>) -> Self {
        self.with(agent_id, MockBehaviour::Respond(AgentResult::completed(answer)))
    }

    /// `agent_id` always reports `status=error` with `message`.
    pub fn failing(self, agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.with(agent_id, MockBehaviour::Respond(AgentResult::failed(message)))
    }

    /// `agent_id` answers with `answer` after `delay`.
    pub fn delayed(
        self,
        agent_id: impl Into<String>,
        delay: Duration,
        answer: impl Into<String>,
    ) -> Self {
        self.with(
            agent_id,
            MockBehaviour::Delayed(
                delay,
                Box::new(MockBehaviour::Respond(AgentResult::completed(answer))),
            ),
        )
    }

    /// `agent_id` never answers.
    pub fn hanging(self, agent_id: impl Into<String>) -> Self {
        self.with(agent_id, MockBehaviour::Hang)
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Requests that targeted `node_id`.
    pub fn calls_for(&self, node_id: &str) -> Vec<AgentRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.node_id == node_id)
            .cloned()
            .collect()
    }

    /// Highest number of requests that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn perform(
        &self,
        mut behaviour: &MockBehaviour,
        request: &AgentRequest,
    ) -> Result<AgentResult, AgentError> {
        loop {
            match behaviour {
                MockBehaviour::Echo => {
                    return Ok(AgentResult::completed(format!(
                        "{}: {}",
                        request.agent.agent_id, request.task
                    )))
                }
                MockBehaviour::Respond(result) => return Ok(result.clone()),
                MockBehaviour::BackendError(msg) => return Err(AgentError::Backend(msg.clone())),
                MockBehaviour::Delayed(delay, inner) => {
                    tokio::time::sleep(*delay).await;
                    behaviour = inner.as_ref();
                }
                MockBehaviour::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

/// Decrements the in-flight counter even when the call is cancelled.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentResult, AgentError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let behaviour = self
            .behaviours
            .get(&request.agent.agent_id)
            .cloned()
            .unwrap_or(MockBehaviour::Echo);

        self.perform(&behaviour, &request).await
    }
}
