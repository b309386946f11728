//! Workflow execution scheduler.
//!
//! `WorkflowScheduler` is the central orchestrator:
//! 1. Seeds the ready set with the graph's root nodes.
//! 2. Dispatches every ready node concurrently, each on its own tokio task
//!    bounded by the node's timeout.
//! 3. Funnels node completions back through a single `JoinSet`, so only the
//!    coordinating loop ever touches the `ExecutionContext`.
//! 4. Releases children once all of their predecessors have completed.
//! 5. Fails fast: the first missing agent, timeout or agent error aborts the
//!    run, cancels the nodes still in flight and drops their results.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use agents::{AgentError, AgentLookup, AgentRequest, AgentResult, AgentRunner};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::{Id as TaskId, JoinSet};
use tracing::{error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::context::{ExecutionContext, NodeState};
use crate::dag::ValidatedGraph;
use crate::error::{EngineError, ExecutionFailure};
use crate::models::Node;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::task::{build_node_task, NodeTask};

// ---------------------------------------------------------------------------
// Per-run options
// ---------------------------------------------------------------------------

/// Cross-cutting parameters for a single run.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Correlation id threaded through to the agent runner and recorded on
    /// the context as `history_session_id`.
    pub session_id: Option<String>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// Passed unchanged to every agent call.
    pub caller_context: Map<String, Value>,
}

impl RunOptions {
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_caller_context(mut self, caller_context: Map<String, Value>) -> Self {
        self.caller_context = caller_context;
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowScheduler
// ---------------------------------------------------------------------------

/// Runs validated workflow graphs against injected agent collaborators.
///
/// The scheduler holds no per-run state, so one instance can drive any
/// number of concurrent executions.
pub struct WorkflowScheduler {
    lookup: Arc<dyn AgentLookup>,
    runner: Arc<dyn AgentRunner>,
    config: SchedulerConfig,
}

impl WorkflowScheduler {
    /// Create a new scheduler.
    pub fn new(
        lookup: Arc<dyn AgentLookup>,
        runner: Arc<dyn AgentRunner>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            lookup,
            runner,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute `graph`, seeding root nodes with `initial_message`.
    ///
    /// # Errors
    /// Returns an [`ExecutionFailure`] naming the first node that could not
    /// run (missing agent, timeout, or agent-reported error), together with
    /// everything recorded up to that point.
    #[instrument(
        name = "workflow_execute",
        skip_all,
        fields(
            workflow_id = %graph.graph().workflow_id,
            execution_id = tracing::field::Empty,
        )
    )]
    pub async fn run(
        &self,
        graph: &ValidatedGraph,
        initial_message: &str,
        options: RunOptions,
    ) -> Result<ExecutionContext, ExecutionFailure> {
        let run = Run::new(self, graph, initial_message, options);
        tracing::Span::current().record(
            "execution_id",
            tracing::field::display(&run.ctx.execution_id),
        );
        run.drive().await
    }
}

// ---------------------------------------------------------------------------
// One execution
// ---------------------------------------------------------------------------

/// Why a node task ended without a usable result.
#[derive(Debug)]
enum NodeFailure {
    TimedOut,
    Backend(AgentError),
    Panicked(String),
}

/// What a node task hands back to the coordinating loop.
#[derive(Debug)]
struct NodeOutcome {
    index: usize,
    result: Result<AgentResult, NodeFailure>,
}

struct Run<'a> {
    scheduler: &'a WorkflowScheduler,
    graph: &'a ValidatedGraph,
    initial_message: &'a str,
    options: RunOptions,
    ctx: ExecutionContext,
    /// node index -> predecessors not yet completed.
    unmet: Vec<usize>,
    ready: VecDeque<usize>,
    tasks: JoinSet<NodeOutcome>,
    in_flight: HashMap<TaskId, usize>,
    permits: Option<Arc<Semaphore>>,
}

impl<'a> Run<'a> {
    fn new(
        scheduler: &'a WorkflowScheduler,
        graph: &'a ValidatedGraph,
        initial_message: &'a str,
        options: RunOptions,
    ) -> Self {
        let ctx = ExecutionContext::new(graph, options.session_id.clone());
        let unmet = (0..graph.len()).map(|i| graph.predecessors(i).len()).collect();
        let permits = scheduler
            .config
            .max_concurrent_nodes
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        Self {
            scheduler,
            graph,
            initial_message,
            options,
            ctx,
            unmet,
            ready: VecDeque::new(),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
            permits,
        }
    }

    async fn drive(mut self) -> Result<ExecutionContext, ExecutionFailure> {
        info!(
            execution_id = %self.ctx.execution_id,
            workflow_id = %self.ctx.workflow_id,
            nodes = self.graph.len(),
            order = ?self.graph.order(),
            "workflow_started"
        );
        self.notify(ProgressEvent::WorkflowStarted {
            execution_id: self.ctx.execution_id,
            workflow_id: self.ctx.workflow_id.clone(),
            total_nodes: self.graph.len(),
        });

        let roots: Vec<usize> = self.graph.roots().collect();
        for index in roots {
            self.make_ready(index);
        }

        loop {
            while let Some(index) = self.ready.pop_front() {
                if let Err(err) = self.dispatch(index) {
                    return Err(self.fail(err));
                }
            }

            let Some(joined) = self.tasks.join_next_with_id().await else {
                break;
            };

            let outcome = match joined {
                Ok((id, outcome)) => {
                    self.in_flight.remove(&id);
                    outcome
                }
                Err(join_err) => {
                    let Some(index) = self.in_flight.remove(&join_err.id()) else {
                        continue;
                    };
                    NodeOutcome {
                        index,
                        result: Err(NodeFailure::Panicked(join_err.to_string())),
                    }
                }
            };

            if let Err(err) = self.complete(outcome) {
                return Err(self.fail(err));
            }
        }

        if self.ctx.completed_nodes.len() != self.graph.len() {
            let pending = self
                .graph
                .graph()
                .nodes
                .iter()
                .filter(|n| !self.ctx.is_completed(&n.node_id))
                .map(|n| n.node_id.clone())
                .collect();
            return Err(self.fail(EngineError::Stalled { pending }));
        }

        self.ctx.finish();
        info!(
            execution_id = %self.ctx.execution_id,
            completed_nodes = self.ctx.completed_nodes.len(),
            tokens_in = self.ctx.cumulative_tokens.tokens_in,
            tokens_out = self.ctx.cumulative_tokens.tokens_out,
            cost = self.ctx.cumulative_tokens.cost,
            "workflow_completed"
        );
        self.notify(ProgressEvent::WorkflowCompleted {
            execution_id: self.ctx.execution_id,
            completed_nodes: self.ctx.completed_nodes.len(),
        });

        Ok(self.ctx)
    }

    fn make_ready(&mut self, index: usize) {
        self.ctx
            .set_state(&self.graph.node(index).node_id, NodeState::Ready);
        self.ready.push_back(index);
    }

    /// Resolve the node's agent, build its task and spawn the agent call.
    fn dispatch(&mut self, index: usize) -> Result<(), EngineError> {
        let graph = self.graph;
        let node = graph.node(index);

        let Some(agent) = self.scheduler.lookup.get_agent(&node.agent_id) else {
            self.ctx.set_state(&node.node_id, NodeState::Failed);
            return Err(EngineError::AgentNotFound {
                node_id: node.node_id.clone(),
                agent_id: node.agent_id.clone(),
            });
        };

        let NodeTask { task, context } = self.task_for(index);

        let request = AgentRequest {
            agent,
            task,
            context,
            node_id: node.node_id.clone(),
            execution_id: self.ctx.execution_id.to_string(),
            session_id: self.options.session_id.clone(),
            caller_context: self.options.caller_context.clone(),
        };

        self.ctx.set_state(&node.node_id, NodeState::Running);
        info!(
            execution_id = %self.ctx.execution_id,
            node_id = %node.node_id,
            agent_id = %node.agent_id,
            timeout_secs = node.timeout,
            "node_started"
        );
        self.notify(ProgressEvent::NodeStarted {
            node_id: node.node_id.clone(),
            agent_id: node.agent_id.clone(),
        });

        let runner = Arc::clone(&self.scheduler.runner);
        let permits = self.permits.clone();
        let limit = Duration::from_secs(node.timeout);

        let handle = self.tasks.spawn(async move {
            // Held until the agent call returns; the timeout covers only the call.
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let result = match tokio::time::timeout(limit, runner.run_agent(request)).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => Err(NodeFailure::Backend(err)),
                Err(_elapsed) => Err(NodeFailure::TimedOut),
            };

            NodeOutcome { index, result }
        });
        self.in_flight.insert(handle.id(), index);

        Ok(())
    }

    /// Task input for the node at `index`, from its predecessors' results.
    fn task_for(&self, index: usize) -> NodeTask {
        let predecessors: Vec<(&Node, &AgentResult)> = self
            .graph
            .predecessors(index)
            .iter()
            .filter_map(|&p| {
                let upstream = self.graph.node(p);
                self.ctx
                    .node_results
                    .get(&upstream.node_id)
                    .map(|result| (upstream, result))
            })
            .collect();

        build_node_task(
            self.graph.node(index),
            &predecessors,
            self.initial_message,
            &self.scheduler.config.synthesis_instruction,
        )
    }

    /// Fold one node outcome into the context and release its children.
    fn complete(&mut self, outcome: NodeOutcome) -> Result<(), EngineError> {
        let graph = self.graph;
        let node = graph.node(outcome.index);
        let node_id = node.node_id.as_str();

        match outcome.result {
            Ok(result) if result.is_success() => {
                let usage = result.usage();
                self.ctx.record_result(node_id, result);
                self.ctx.mark_completed(node_id);

                info!(
                    execution_id = %self.ctx.execution_id,
                    node_id = %node_id,
                    tokens_in = usage.tokens_in,
                    tokens_out = usage.tokens_out,
                    "node_completed"
                );
                self.notify(ProgressEvent::NodeCompleted {
                    node_id: node_id.to_owned(),
                    tokens_in: usage.tokens_in,
                    tokens_out: usage.tokens_out,
                    cost: usage.cost,
                });

                for &child in graph.successors(outcome.index) {
                    self.unmet[child] -= 1;
                    if self.unmet[child] == 0 {
                        self.make_ready(child);
                    }
                }
                Ok(())
            }
            Ok(result) => {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "agent reported an error without a message".to_owned());
                self.ctx.record_result(node_id, result);
                self.ctx.set_state(node_id, NodeState::Failed);
                Err(EngineError::NodeExecutionFailed {
                    node_id: node_id.to_owned(),
                    message,
                })
            }
            Err(NodeFailure::TimedOut) => {
                self.ctx.set_state(node_id, NodeState::TimedOut);
                Err(EngineError::NodeTimeout {
                    node_id: node_id.to_owned(),
                    timeout_secs: node.timeout,
                })
            }
            Err(NodeFailure::Backend(err)) => {
                self.ctx.set_state(node_id, NodeState::Failed);
                Err(EngineError::NodeExecutionFailed {
                    node_id: node_id.to_owned(),
                    message: err.to_string(),
                })
            }
            Err(NodeFailure::Panicked(message)) => {
                self.ctx.set_state(node_id, NodeState::Failed);
                Err(EngineError::NodeExecutionFailed {
                    node_id: node_id.to_owned(),
                    message,
                })
            }
        }
    }

    /// Abort the run: cancel in-flight nodes and hand back what was recorded.
    fn fail(mut self, err: EngineError) -> ExecutionFailure {
        self.tasks.abort_all();
        self.ctx.abort();

        error!(
            execution_id = %self.ctx.execution_id,
            node_id = err.node_id().unwrap_or("-"),
            category = err.category(),
            error = %err,
            cancelled_nodes = self.in_flight.len(),
            "workflow_failed"
        );

        if let Some(node_id) = err.node_id() {
            self.notify(ProgressEvent::NodeFailed {
                node_id: node_id.to_owned(),
                category: err.category(),
                message: err.to_string(),
            });
        }
        self.notify(ProgressEvent::WorkflowFailed {
            execution_id: self.ctx.execution_id,
            message: err.to_string(),
        });

        ExecutionFailure {
            error: err,
            context: Box::new(self.ctx),
        }
    }

    fn notify(&self, event: ProgressEvent) {
        let Some(sink) = &self.options.progress else {
            return;
        };
        if let Err(err) = sink.notify(&event, &self.ctx) {
            warn!(
                execution_id = %self.ctx.execution_id,
                error = %err,
                "progress sink failed, ignoring"
            );
        }
    }
}
