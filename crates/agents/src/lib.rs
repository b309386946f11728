//! `agents` crate — the agent collaborator contracts and their in-process
//! implementations.
//!
//! The workflow engine never talks to an agent backend directly: it resolves
//! agents through [`AgentLookup`] and runs them through [`AgentRunner`].

pub mod error;
pub mod traits;
pub mod store;
pub mod mock;

pub use error::AgentError;
pub use store::AgentStore;
pub use traits::{
    AgentConfig, AgentLookup, AgentRequest, AgentResult, AgentRunner, AgentStatus, TokenUsage,
};
