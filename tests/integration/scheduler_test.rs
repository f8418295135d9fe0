//! Scheduler Integration Tests
//!
//! Runs the layered scheduler over a registry shaped like the real
//! blueprint pipeline: a requirements analysis phase feeding four
//! document sections, with an explicit dependency between phases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use blueprint_orchestrator::{
    Agent, AgentInput, AgentRegistry, RunStatus, Scheduler, SchedulerConfig,
};

/// A blueprint section generator with scripted behavior.
struct SectionAgent {
    id: String,
    deps: Vec<String>,
    fail: bool,
    start_log: Arc<Mutex<Vec<String>>>,
}

impl SectionAgent {
    fn new(id: &str, deps: &[&str], start_log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            fail: false,
            start_log,
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Agent for SectionAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn run(&self, input: AgentInput) -> Result<serde_json::Value, String> {
        self.start_log.lock().unwrap().push(self.id.clone());
        if self.fail {
            return Err(format!("{}: all providers failed", self.id));
        }
        // Echo which dependencies were visible, and whether they succeeded.
        let deps_seen: HashMap<&str, bool> = self
            .deps
            .iter()
            .filter_map(|dep| input.previous(dep).map(|o| (dep.as_str(), o.succeeded)))
            .collect();
        Ok(json!({
            "section": self.id,
            "language": input.language,
            "depsSeen": deps_seen,
        }))
    }
}

/// The two-phase pipeline: analysis feeds every section, and the
/// implementation plan additionally waits for the proposal.
fn blueprint_registry(start_log: &Arc<Mutex<Vec<String>>>) -> Arc<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(SectionAgent::new("analysis", &[], start_log.clone())));
    registry.register(Arc::new(SectionAgent::new(
        "roadmap",
        &["analysis"],
        start_log.clone(),
    )));
    registry.register(Arc::new(SectionAgent::new(
        "diagrams",
        &["analysis"],
        start_log.clone(),
    )));
    registry.register(Arc::new(SectionAgent::new(
        "proposal",
        &["analysis"],
        start_log.clone(),
    )));
    registry.register(Arc::new(SectionAgent::new(
        "implementation-plan",
        &["analysis", "proposal"],
        start_log.clone(),
    )));
    Arc::new(registry)
}

fn input() -> AgentInput {
    let mut answers = HashMap::new();
    answers.insert("industry".to_string(), "logistics".to_string());
    AgentInput::new(answers, "en").with_context("Founder notes from the interview")
}

#[tokio::test]
async fn test_full_blueprint_run_completes_in_dependency_order() {
    let start_log = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::new(blueprint_registry(&start_log));

    let state = scheduler.run(input()).await.unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.completed_ids.len(), 5);
    assert!(state.failed_ids.is_empty());

    let starts = start_log.lock().unwrap().clone();
    let pos = |id: &str| starts.iter().position(|s| s == id).unwrap();
    assert_eq!(pos("analysis"), 0);
    assert!(pos("analysis") < pos("roadmap"));
    assert!(pos("analysis") < pos("diagrams"));
    assert!(pos("proposal") < pos("implementation-plan"));

    // Every section saw its dependencies as successful.
    let plan = state.outcome("implementation-plan").unwrap();
    let deps_seen = &plan.data.as_ref().unwrap()["depsSeen"];
    assert_eq!(deps_seen["analysis"], json!(true));
    assert_eq!(deps_seen["proposal"], json!(true));
}

#[tokio::test]
async fn test_failed_section_does_not_block_the_rest_of_the_blueprint() {
    let start_log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(SectionAgent::new("analysis", &[], start_log.clone())));
    registry.register(Arc::new(
        SectionAgent::new("proposal", &["analysis"], start_log.clone()).failing(),
    ));
    registry.register(Arc::new(SectionAgent::new(
        "implementation-plan",
        &["analysis", "proposal"],
        start_log.clone(),
    )));

    let state = Scheduler::new(Arc::new(registry)).run(input()).await.unwrap();

    // The run is marked failed, but the dependent section still executed
    // and observed the failure through its inputs.
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.failed_ids, vec!["proposal"]);
    assert!(state.completed_ids.contains(&"implementation-plan".to_string()));

    let plan = state.outcome("implementation-plan").unwrap();
    let deps_seen = &plan.data.as_ref().unwrap()["depsSeen"];
    assert_eq!(deps_seen["proposal"], json!(false));

    let proposal = state.outcome("proposal").unwrap();
    assert!(!proposal.succeeded);
    assert!(proposal
        .error
        .as_deref()
        .unwrap()
        .contains("all providers failed"));
}

#[tokio::test]
async fn test_run_state_is_fresh_per_run() {
    let start_log = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::new(blueprint_registry(&start_log))
        .with_config(SchedulerConfig { max_parallel: 2 });

    let first = scheduler.run(input()).await.unwrap();
    let second = scheduler.run(input()).await.unwrap();

    assert_eq!(first.completed_ids.len(), 5);
    assert_eq!(second.completed_ids.len(), 5);
    // Ten starts across two runs: no state leaked between them.
    assert_eq!(start_log.lock().unwrap().len(), 10);
}
