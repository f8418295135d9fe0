//! Agent Registry
//!
//! Stores `Arc<dyn Agent>` instances keyed by id and computes a
//! dependency-respecting execution order. Cycle detection happens here,
//! once, before any run executes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::agent::Agent;

/// Errors from registry ordering.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Dependencies form a cycle. Fatal configuration error; the cycle
    /// path is reported in registration order of discovery.
    #[error("Circular dependency detected: {0:?}")]
    CycleDetected(Vec<String>),
}

/// Registry for blueprint generation agents.
///
/// Built once at startup and passed to the scheduler by parameter. Ties
/// among independent agents resolve in registration order.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
    /// Registration order, for stable ordering among independent agents.
    order: Vec<String>,
}

impl AgentRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register an agent by id.
    ///
    /// A prior registration with the same id is replaced and keeps its
    /// original position in registration order.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let id = agent.id().to_string();
        if self.agents.insert(id.clone(), agent).is_none() {
            self.order.push(id);
        }
    }

    /// Get an agent by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).cloned()
    }

    /// Check if an agent is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Registered agent ids in registration order.
    pub fn agent_ids(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Return all agents ordered so that every agent appears after all of
    /// its dependencies.
    ///
    /// Depth-first visit with a "visiting" path marker; encountering an
    /// agent already on the path raises `CycleDetected` immediately.
    /// Dependencies on unregistered ids are not an ordering error; they
    /// surface at run time as unsatisfiable.
    pub fn dependency_order(&self) -> Result<Vec<Arc<dyn Agent>>, RegistryError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        let mut sorted: Vec<String> = Vec::new();

        for id in &self.order {
            self.visit(id, &mut visited, &mut path, &mut sorted)?;
        }

        Ok(sorted
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect())
    }

    /// DFS helper; appends `id` to `sorted` after all its dependencies.
    fn visit(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
        sorted: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        if visited.contains(id) {
            return Ok(());
        }

        if let Some(pos) = path.iter().position(|p| p == id) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(id.to_string());
            return Err(RegistryError::CycleDetected(cycle));
        }

        let agent = match self.agents.get(id) {
            Some(agent) => agent,
            // Unregistered dependency; nothing to order here.
            None => return Ok(()),
        };

        path.push(id.to_string());
        for dep in agent.depends_on() {
            self.visit(dep, visited, path, sorted)?;
        }
        path.pop();

        visited.insert(id.to_string());
        sorted.push(id.to_string());
        Ok(())
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
