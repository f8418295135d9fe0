//! Document Assembly
//!
//! Builds one merged blueprint document from several concurrent
//! generation calls. Every call runs to a terminal state regardless of
//! its siblings; an essential group that cannot be resolved aborts the
//! whole document, an optional group degrades to its configured default.

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors from document assembly.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// An essential call group could not be resolved after exhausting its
    /// own fallback and recovery; no document is produced. This is the
    /// only error class that reaches the orchestrator's caller.
    #[error("essential group '{group}' failed: {reason}")]
    EssentialGroupFailed { group: String, reason: String },
}

type GroupFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send + 'static>>;

/// One named generation call inside a document build.
///
/// The call is typically a fallback-chain invocation followed by a
/// recovery pass; both expected failure shapes (provider exhaustion and
/// recovery exhaustion) arrive here as the same `Err` variant.
pub struct CallGroup {
    key: String,
    essential: bool,
    default_value: Value,
    call: GroupFuture,
}

impl CallGroup {
    /// Essential group: failure aborts the whole document.
    pub fn essential<Fut>(key: impl Into<String>, call: Fut) -> Self
    where
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            key: key.into(),
            essential: true,
            default_value: Value::Null,
            call: Box::pin(call),
        }
    }

    /// Optional group: failure substitutes `default_value`. A document
    /// with an empty section is preferable to no document.
    pub fn optional<Fut>(key: impl Into<String>, default_value: Value, call: Fut) -> Self
    where
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            key: key.into(),
            essential: false,
            default_value,
            call: Box::pin(call),
        }
    }

    /// The field name this group fills in the merged document.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this group aborts the document on failure.
    pub fn is_essential(&self) -> bool {
        self.essential
    }
}

/// Run every group's call concurrently and merge the results into one
/// document keyed by group name.
///
/// This is a barrier join: every call reaches a terminal state before
/// any group is resolved, so sibling calls are never cancelled by a
/// failure. Completion order within the fan-out is not guaranteed.
pub async fn build_document(groups: Vec<CallGroup>) -> Result<Value, AggregationError> {
    let handles: Vec<_> = groups
        .into_iter()
        .map(|group| {
            let handle = tokio::spawn(group.call);
            (group.key, group.essential, group.default_value, handle)
        })
        .collect();

    // Barrier join first; essential/optional resolution only starts once
    // every call is terminal.
    let mut resolved = Vec::with_capacity(handles.len());
    for (key, essential, default_value, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(format!("call panicked: {}", join_error)),
        };
        resolved.push((key, essential, default_value, result));
    }

    let total = resolved.len();
    let mut merged = Map::new();
    let mut defaulted = 0usize;

    for (key, essential, default_value, result) in resolved {
        match result {
            Ok(value) => {
                merged.insert(key, value);
            }
            Err(reason) if essential => {
                error!(
                    group = %key,
                    %reason,
                    "essential group failed; aborting document assembly"
                );
                return Err(AggregationError::EssentialGroupFailed { group: key, reason });
            }
            Err(reason) => {
                warn!(
                    group = %key,
                    %reason,
                    "optional group failed; substituting default"
                );
                merged.insert(key, default_value);
                defaulted += 1;
            }
        }
    }

    info!(groups = total, defaulted, "document assembled");
    Ok(Value::Object(merged))
}
