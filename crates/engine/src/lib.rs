//! `engine` crate — workflow graph models, DAG validation, and the
//! concurrent execution scheduler.
//!
//! Validate first, then run:
//!
//! ```ignore
//! let graph = ValidatedGraph::new(workflow)?;
//! let scheduler = WorkflowScheduler::new(lookup, runner, SchedulerConfig::default());
//! let context = scheduler.run(&graph, "initial message", RunOptions::default()).await?;
//! ```

pub mod models;
pub mod error;
pub mod dag;
pub mod task;
pub mod context;
pub mod progress;
pub mod config;
pub mod executor;

pub use models::{WorkflowGraph, Node, Edge};
pub use error::{EngineError, ExecutionFailure};
pub use dag::{validate_dag, ValidatedGraph};
pub use task::{build_node_task, NodeTask};
pub use context::{ExecutionContext, NodeState, RunStatus};
pub use progress::{ChannelProgressSink, ProgressEvent, ProgressSink};
pub use config::SchedulerConfig;
pub use executor::{RunOptions, WorkflowScheduler};
