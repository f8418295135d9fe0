//! Integration Tests Module
//!
//! End-to-end tests for the blueprint orchestration layer:
//! - Scheduler runs over a realistic blueprint agent registry
//! - The full generation pipeline: fallback chain, recovery parser, and
//!   document assembly composed the way the application composes them

// Dependency-layered scheduler tests
mod scheduler_test;

// Fallback + recovery + aggregation pipeline tests
mod document_pipeline_test;
