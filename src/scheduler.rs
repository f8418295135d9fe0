//! Layered Scheduler
//!
//! Runs registered agents in dependency layers: every agent whose
//! dependencies have all reached a terminal outcome is launched
//! concurrently, the layer is barrier-joined, and outcomes are recorded
//! before the next layer is computed. A failing agent never blocks its
//! dependents and never aborts the run; only a dependency cycle aborts,
//! before anything executes.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentInput, AgentOutcome, RunState, RunStatus};
use crate::registry::{AgentRegistry, RegistryError};

/// Configuration for scheduler runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Maximum agents launched concurrently within one layer. A ready
    /// layer larger than this is split into sub-layers.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

/// Dependency-layered scheduler over an agent registry.
pub struct Scheduler {
    registry: Arc<AgentRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a scheduler over the given registry.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            config: SchedulerConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute all registered agents in dependency layers.
    ///
    /// A cycle in the registry aborts before any agent executes. After
    /// that the scheduler never fails: agent errors and panics are both
    /// converted into failed outcomes. The final status is `Failed` iff
    /// at least one agent failed.
    pub async fn run(&self, input: AgentInput) -> Result<RunState, RegistryError> {
        // Cycle errors propagate before anything executes.
        let ordered = self.registry.dependency_order()?;

        let mut state = RunState::new();
        state.status = RunStatus::Running;

        let mut pending = ordered;
        while !pending.is_empty() {
            let (ready, rest): (Vec<Arc<dyn Agent>>, Vec<Arc<dyn Agent>>) =
                pending.into_iter().partition(|agent| {
                    agent.depends_on().iter().all(|dep| state.is_terminal(dep))
                });

            if ready.is_empty() {
                // Typically a dependency on an id that was never
                // registered. The stalled agents get no outcome.
                let stalled: Vec<&str> = rest.iter().map(|a| a.id()).collect();
                warn!(
                    ?stalled,
                    "no runnable agents remain; stopping with unresolved dependencies"
                );
                break;
            }
            pending = rest;

            for layer in ready.chunks(self.config.max_parallel.max(1)) {
                self.run_layer(layer, &input, &mut state).await;
            }
        }

        state.finish();
        info!(
            status = %state.status,
            completed = state.completed_ids.len(),
            failed = state.failed_ids.len(),
            "blueprint run finished"
        );
        Ok(state)
    }

    /// Launch one layer concurrently, barrier-join it, and record every
    /// outcome. A single failure does not cancel siblings.
    async fn run_layer(&self, layer: &[Arc<dyn Agent>], input: &AgentInput, state: &mut RunState) {
        debug!(
            agents = ?layer.iter().map(|a| a.id()).collect::<Vec<_>>(),
            "launching layer"
        );

        let ids: Vec<String> = layer.iter().map(|a| a.id().to_string()).collect();
        let handles: Vec<_> = layer
            .iter()
            .map(|agent| {
                let agent = Arc::clone(agent);
                let mut layer_input = input.clone();
                layer_input.previous_results = state.outcomes.clone();
                tokio::spawn(async move {
                    let id = agent.id().to_string();
                    let started = Instant::now();
                    match agent.run(layer_input).await {
                        Ok(data) => {
                            AgentOutcome::success(id, data, started.elapsed().as_millis() as u64)
                        }
                        Err(error) => {
                            AgentOutcome::failure(id, error, started.elapsed().as_millis() as u64)
                        }
                    }
                })
            })
            .collect();

        for (id, joined) in ids.into_iter().zip(join_all(handles).await) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                // A panicking agent is just another failed outcome.
                Err(join_error) => {
                    AgentOutcome::failure(id, format!("agent panicked: {}", join_error), 0)
                }
            };
            debug!(
                agent = %outcome.agent_id,
                succeeded = outcome.succeeded,
                duration_ms = outcome.duration_ms,
                "outcome recorded"
            );
            state.record(outcome);
        }
    }
}
