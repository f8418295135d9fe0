//! Agent Model
//!
//! Core types for blueprint generation agents: the `Agent` trait, the
//! input every agent receives, the immutable outcome it produces, and the
//! per-run state the scheduler maintains.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Input handed to every agent at run time.
///
/// `previous_results` is a read-only view of every agent that has already
/// reached a terminal outcome in the current run, including failed ones.
/// Agents must not mutate shared state; everything they produce comes
/// back through their return value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInput {
    /// User-collected answers, keyed by question id.
    pub answers: HashMap<String, String>,
    /// Auxiliary free-text context (uploaded documents, chat notes).
    pub context: Option<String>,
    /// Language tag for the generated document (e.g. "en", "es").
    pub language: String,
    /// Terminal outcomes of agents that already finished in this run.
    pub previous_results: HashMap<String, AgentOutcome>,
}

impl AgentInput {
    /// Create an input from collected answers and a language tag.
    pub fn new(answers: HashMap<String, String>, language: impl Into<String>) -> Self {
        Self {
            answers,
            context: None,
            language: language.into(),
            previous_results: HashMap::new(),
        }
    }

    /// Attach auxiliary free-text context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Outcome of a dependency, if it has reached a terminal state.
    pub fn previous(&self, agent_id: &str) -> Option<&AgentOutcome> {
        self.previous_results.get(agent_id)
    }
}

/// Immutable record of one agent's terminal state in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    /// Id of the agent this outcome belongs to.
    pub agent_id: String,
    /// Whether the agent finished successfully.
    pub succeeded: bool,
    /// Payload produced on success.
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Wall-clock duration of the agent's execution.
    pub duration_ms: u64,
}

impl AgentOutcome {
    /// Create a successful outcome.
    pub fn success(
        agent_id: impl Into<String>,
        data: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            succeeded: true,
            data: Some(data),
            error: None,
            duration_ms,
        }
    }

    /// Create a failed outcome.
    pub fn failure(
        agent_id: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            succeeded: false,
            data: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Lifecycle status of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has started.
    Idle,
    /// The scheduler is executing layers.
    Running,
    /// Every executed agent succeeded.
    Completed,
    /// At least one agent failed.
    Failed,
}

impl RunStatus {
    /// Check if this status indicates the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// State of a single scheduler run.
///
/// Created fresh at the start of every run and mutated only by the
/// scheduler, strictly between layer joins. There is never a concurrent
/// writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Ids of agents that finished successfully, in completion order.
    pub completed_ids: Vec<String>,
    /// Ids of agents that finished unsuccessfully, in completion order.
    pub failed_ids: Vec<String>,
    /// Terminal outcome per agent id. At most one entry per agent.
    pub outcomes: HashMap<String, AgentOutcome>,
}

impl RunState {
    /// Create a fresh idle run state.
    pub fn new() -> Self {
        Self {
            status: RunStatus::Idle,
            completed_ids: Vec::new(),
            failed_ids: Vec::new(),
            outcomes: HashMap::new(),
        }
    }

    /// Check whether an agent has reached a terminal outcome.
    pub fn is_terminal(&self, agent_id: &str) -> bool {
        self.outcomes.contains_key(agent_id)
    }

    /// Terminal outcome of an agent, if recorded.
    pub fn outcome(&self, agent_id: &str) -> Option<&AgentOutcome> {
        self.outcomes.get(agent_id)
    }

    /// Counts of (completed, failed) agents so far.
    pub fn progress(&self) -> (usize, usize) {
        (self.completed_ids.len(), self.failed_ids.len())
    }

    /// Record a terminal outcome. A second outcome for the same agent id
    /// is ignored; one outcome per agent per run.
    pub(crate) fn record(&mut self, outcome: AgentOutcome) {
        if self.outcomes.contains_key(&outcome.agent_id) {
            return;
        }
        if outcome.succeeded {
            self.completed_ids.push(outcome.agent_id.clone());
        } else {
            self.failed_ids.push(outcome.agent_id.clone());
        }
        self.outcomes.insert(outcome.agent_id.clone(), outcome);
    }

    /// Settle the final status from the failure set.
    pub(crate) fn finish(&mut self) {
        self.status = if self.failed_ids.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// A named unit of generation work with declared dependencies.
///
/// Agents are registered once into an `AgentRegistry` before any run and
/// the registry is immutable while a run is in flight. An agent only
/// begins after every agent in `depends_on` has reached a terminal
/// outcome; dependency means "attempted", not "succeeded".
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique id used for registration and dependency references.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Ids of agents that must reach a terminal outcome before this one
    /// runs.
    fn depends_on(&self) -> &[String] {
        &[]
    }

    /// Produce this agent's payload. An `Err` becomes a failed outcome;
    /// it never aborts the run.
    async fn run(&self, input: AgentInput) -> Result<serde_json::Value, String>;
}
