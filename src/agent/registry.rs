//! Agent registry: kind → generator lookup table.

use super::{
    AgentKind, CollectionAgent, GeneratorAgent, NullAgent, ScenarioAgent, TabularAgent,
};
use crate::provider::ModelProviderClient;
use std::collections::HashMap;
use std::sync::Arc;

/// Generators by kind; kinds without an entry resolve to a `NullAgent`.
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn GeneratorAgent>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Registry with every built-in generator sharing one completion client
    pub fn with_defaults(client: Arc<dyn ModelProviderClient>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TabularAgent::new(client.clone())));
        registry.register(Arc::new(ScenarioAgent::new(client.clone())));
        registry.register(Arc::new(CollectionAgent::new(client)));
        registry
    }

    /// Register a generator under its own kind, replacing any previous one
    pub fn register(&mut self, agent: Arc<dyn GeneratorAgent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Resolve a generator; never fails
    pub fn get(&self, kind: AgentKind) -> Arc<dyn GeneratorAgent> {
        match self.agents.get(&kind) {
            Some(agent) => Arc::clone(agent),
            None => Arc::new(NullAgent::new(kind)),
        }
    }

    pub fn is_registered(&self, kind: AgentKind) -> bool {
        self.agents.contains_key(&kind)
    }

    pub fn registered_kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.agents.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
