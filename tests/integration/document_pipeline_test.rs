//! Document Pipeline Integration Tests
//!
//! Composes the three layers the way the application does: each blueprint
//! section is a fallback-chain call whose raw provider text goes through
//! the recovery parser, and the sections are merged by the document
//! builder with essential/optional semantics.

use std::time::Duration;

use serde_json::{json, Value};

use blueprint_orchestrator::{
    build_document, recover, AggregationError, CallGroup, FallbackChain, FallbackConfig,
    FieldSpec, ProviderAttempt, ProviderError,
};

fn roadmap_schema() -> Vec<FieldSpec> {
    vec![FieldSpec::text("title"), FieldSpec::text_array("milestones")]
}

fn proposal_schema() -> Vec<FieldSpec> {
    vec![FieldSpec::text("title"), FieldSpec::text("summary")]
}

/// One section of the blueprint: fallback chain over providers, then
/// recovery of the winning provider's raw text.
async fn generate_section(
    label: &str,
    chain: FallbackChain,
    attempts: Vec<ProviderAttempt<String>>,
    schema: Vec<FieldSpec>,
) -> Result<Value, String> {
    let outcome = chain
        .call_with_fallback(label, attempts, String::new())
        .await;
    if outcome.used_default {
        return Err(format!("{} providers exhausted", label));
    }
    recover(&outcome.data, label, &schema).map_err(|e| e.to_string())
}

fn failing_attempt(id: &str) -> ProviderAttempt<String> {
    let id = id.to_string();
    ProviderAttempt::new(id.clone(), move || async move {
        Err(ProviderError::invocation(format!("{} quota exceeded", id)))
    })
}

#[tokio::test]
async fn test_blueprint_assembles_from_mixed_provider_quality() {
    // Roadmap (essential): first provider has no credential, second
    // returns a fenced document truncated mid-token-budget.
    let roadmap_attempts = vec![
        ProviderAttempt::new("openai", || async {
            Ok("unused".to_string())
        })
        .available_if(false),
        ProviderAttempt::new("gemini", || async {
            Ok("```json\n{\"title\": \"Go-to-market roadmap\", \"milestones\": [\"Discovery\", \"MVP\"".to_string())
        }),
    ];

    // Proposal (optional): provider wraps the payload in prose.
    let proposal_attempts = vec![ProviderAttempt::new("mistral", || async {
        Ok("Sure, here is the proposal:\n{\"title\": \"Seed round proposal\", \"summary\": \"Lean logistics platform\"}\nHope this helps!".to_string())
    })];

    // Diagrams (optional): every provider fails.
    let diagram_attempts = vec![failing_attempt("openai"), failing_attempt("gemini")];

    let doc = build_document(vec![
        CallGroup::essential(
            "roadmap",
            generate_section(
                "roadmap",
                FallbackChain::new(),
                roadmap_attempts,
                roadmap_schema(),
            ),
        ),
        CallGroup::optional(
            "proposal",
            json!({}),
            generate_section(
                "proposal",
                FallbackChain::new(),
                proposal_attempts,
                proposal_schema(),
            ),
        ),
        CallGroup::optional(
            "diagrams",
            json!({"diagrams": []}),
            generate_section(
                "diagrams",
                FallbackChain::new(),
                diagram_attempts,
                vec![FieldSpec::text_array("diagrams")],
            ),
        ),
    ])
    .await
    .unwrap();

    // Truncated roadmap was repaired into a complete document.
    assert_eq!(doc["roadmap"]["title"], json!("Go-to-market roadmap"));
    assert_eq!(doc["roadmap"]["milestones"], json!(["Discovery", "MVP"]));

    // Prose-wrapped proposal was sliced out cleanly.
    assert_eq!(doc["proposal"]["title"], json!("Seed round proposal"));

    // Exhausted optional section degraded to its default.
    assert_eq!(doc["diagrams"], json!({"diagrams": []}));
}

#[tokio::test]
async fn test_essential_section_failing_everywhere_aborts_the_document() {
    let result = build_document(vec![
        CallGroup::essential(
            "roadmap",
            generate_section(
                "roadmap",
                FallbackChain::new(),
                vec![failing_attempt("openai"), failing_attempt("gemini")],
                roadmap_schema(),
            ),
        ),
        CallGroup::optional(
            "proposal",
            json!({}),
            async { Ok(json!({"title": "Would have succeeded"})) },
        ),
    ])
    .await;

    match result {
        Err(AggregationError::EssentialGroupFailed { group, .. }) => {
            assert_eq!(group, "roadmap");
        }
        Ok(_) => panic!("Expected the essential failure to abort assembly"),
    }
}

#[tokio::test]
async fn test_unrecoverable_text_counts_as_a_section_failure() {
    // The provider answers, but with nothing salvageable; recovery
    // exhaustion is treated exactly like provider failure.
    let attempts = vec![ProviderAttempt::new("openai", || async {
        Ok("I'm sorry, I cannot produce that document.".to_string())
    })];

    let doc = build_document(vec![
        CallGroup::essential("roadmap", async { Ok(json!({"title": "ok"})) }),
        CallGroup::optional(
            "proposal",
            json!({"title": ""}),
            generate_section("proposal", FallbackChain::new(), attempts, proposal_schema()),
        ),
    ])
    .await
    .unwrap();

    assert_eq!(doc["proposal"], json!({"title": ""}));
}

#[tokio::test]
async fn test_partial_field_extraction_feeds_the_document() {
    // No braces at all; only individually declared fields survive. The
    // truncated `summary` is omitted, never invented.
    let attempts = vec![ProviderAttempt::new("gemini", || async {
        Ok("Proposal draft -> \"title\": \"Seed round proposal\", \"summary\": \"Lean logistics".to_string())
    })];

    let doc = build_document(vec![CallGroup::optional(
        "proposal",
        json!({}),
        generate_section("proposal", FallbackChain::new(), attempts, proposal_schema()),
    )])
    .await
    .unwrap();

    assert_eq!(doc["proposal"], json!({"title": "Seed round proposal"}));
}

#[tokio::test]
async fn test_stalled_provider_hits_deadline_and_chain_advances() {
    let chain = FallbackChain::with_config(FallbackConfig {
        attempt_deadline_ms: Some(25),
    });

    let attempts = vec![
        ProviderAttempt::new("openai", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never returned".to_string())
        }),
        ProviderAttempt::new("gemini", || async {
            Ok("{\"title\": \"Recovered after deadline\"}".to_string())
        }),
    ];

    let doc = build_document(vec![CallGroup::essential(
        "proposal",
        generate_section("proposal", chain, attempts, proposal_schema()),
    )])
    .await
    .unwrap();

    assert_eq!(doc["proposal"]["title"], json!("Recovered after deadline"));
}
