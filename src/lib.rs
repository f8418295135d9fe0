//! Blueprint Orchestrator
//!
//! Generation orchestration layer for Blueprint Studio: runs generation
//! agents in dependency order with maximum parallelism, tries multiple
//! external providers per call until one returns usable output, and
//! recovers structured results from text a provider may return
//! malformed, truncated, or wrapped in extraneous formatting.
//!
//! - `agent` - the `Agent` trait, run inputs/outcomes, per-run state
//! - `registry` - agent registration and dependency ordering
//! - `scheduler` - layered parallel execution over the registry
//! - `fallback` - ordered provider attempts with default substitution
//! - `recovery` - salvage of structured output from provider text
//! - `document` - essential/optional call groups merged into one document
//!
//! Everything below the document builder's essential-group boundary is
//! recovered locally: agent failures become failed outcomes, provider
//! failures advance the fallback chain, unrecoverable optional sections
//! degrade to defaults. The caller sees an error only when an essential
//! section failed everywhere.

pub mod agent;
pub mod document;
pub mod fallback;
pub mod recovery;
pub mod registry;
pub mod scheduler;

// Re-export main types
pub use agent::{Agent, AgentInput, AgentOutcome, RunState, RunStatus};
pub use document::{build_document, AggregationError, CallGroup};
pub use fallback::{
    AttemptRecord, AttemptStatus, FallbackChain, FallbackConfig, FallbackOutcome,
    ProviderAttempt, ProviderError, DEFAULT_PROVIDER,
};
pub use recovery::{recover, FieldKind, FieldSpec, RecoveryError};
pub use registry::{AgentRegistry, RegistryError};
pub use scheduler::{Scheduler, SchedulerConfig};
