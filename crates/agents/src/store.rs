//! `AgentStore` — an in-memory [`AgentLookup`].

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::{AgentConfig, AgentLookup};

/// Agent definitions held in memory, keyed by `agent_id`.
///
/// Each scheduler gets its own store instance, so concurrent executions (and
/// tests) never share agent definitions by accident.
#[derive(Debug, Default)]
pub struct AgentStore {
    agents: RwLock<HashMap<String, AgentConfig>>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an iterator of configurations.
    pub fn with_agents(agents: impl IntoIterator<Item = AgentConfig>) -> Self {
        let store = Self::new();
        for agent in agents {
            store.insert(agent);
        }
        store
    }

    /// Insert or replace an agent definition.
    pub fn insert(&self, agent: AgentConfig) {
        debug!(agent_id = %agent.agent_id, "registering agent");
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.insert(agent.agent_id.clone(), agent);
    }

    /// Remove an agent definition, returning it if present.
    pub fn remove(&self, agent_id: &str) -> Option<AgentConfig> {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.remove(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AgentLookup for AgentStore {
    fn get_agent(&self, agent_id: &str) -> Option<AgentConfig> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent_id)
            .cloned()
    }
}
