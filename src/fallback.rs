//! Provider Fallback Chain
//!
//! Tries an ordered list of provider attempts until one returns usable
//! output. The chain never fails its caller: when every provider is
//! skipped or fails, the configured default value is returned and the
//! attempt log records the degradation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Provider id reported when the chain falls back to its default value.
///
/// Nominal only: when the final attempt-log entry records default
/// substitution, no provider actually produced the data. Callers should
/// check `FallbackOutcome::used_default` instead of interpreting this id.
pub const DEFAULT_PROVIDER: &str = "default";

/// Errors a single provider attempt can produce.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider's precondition is not met (e.g. no credential).
    #[error("provider not available: {0}")]
    Unavailable(String),

    /// The per-attempt deadline expired before the provider answered.
    #[error("attempt deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    /// The provider was invoked and failed.
    #[error("provider invocation failed: {0}")]
    Invocation(String),
}

impl ProviderError {
    /// Create an invocation error.
    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }
}

type AttemptFuture<T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send>>;

/// One provider in a fallback chain: an availability precondition plus
/// an invocation producing the provider's payload.
pub struct ProviderAttempt<T> {
    provider_id: String,
    available: bool,
    invoke: Box<dyn FnOnce() -> AttemptFuture<T> + Send>,
}

impl<T> ProviderAttempt<T> {
    /// Create an attempt that is eligible to run.
    pub fn new<F, Fut>(provider_id: impl Into<String>, invoke: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        Self {
            provider_id: provider_id.into(),
            available: true,
            invoke: Box::new(move || {
                let fut: AttemptFuture<T> = Box::pin(invoke());
                fut
            }),
        }
    }

    /// Gate this attempt behind an availability precondition, e.g. "is a
    /// credential configured". An unavailable attempt is skipped, never
    /// invoked.
    pub fn available_if(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// The provider's id.
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Whether the precondition is met.
    pub fn is_available(&self) -> bool {
        self.available
    }
}

/// Terminal status of one attempt in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Precondition not met; the provider was never invoked.
    Skipped,
    /// The provider returned usable output.
    Success,
    /// The provider was invoked and failed.
    Failed(String),
    /// Every provider was skipped or failed; the default value was used.
    DefaultSubstituted,
}

/// Record of a single attempt in a fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Provider that was considered.
    pub provider_id: String,
    /// What happened.
    pub status: AttemptStatus,
    /// Duration of the attempt; zero for skipped providers.
    pub duration_ms: u64,
    /// RFC3339 timestamp when the attempt was considered.
    pub started_at: String,
}

impl AttemptRecord {
    fn skipped(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            status: AttemptStatus::Skipped,
            duration_ms: 0,
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn success(provider_id: &str, duration_ms: u64) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            status: AttemptStatus::Success,
            duration_ms,
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn failed(provider_id: &str, reason: String, duration_ms: u64) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            status: AttemptStatus::Failed(reason),
            duration_ms,
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn default_substituted() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER.to_string(),
            status: AttemptStatus::DefaultSubstituted,
            duration_ms: 0,
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            AttemptStatus::Skipped => write!(f, "{}: skipped (unavailable)", self.provider_id),
            AttemptStatus::Success => {
                write!(f, "{}: success ({}ms)", self.provider_id, self.duration_ms)
            }
            AttemptStatus::Failed(reason) => {
                write!(f, "{}: failed ({})", self.provider_id, reason)
            }
            AttemptStatus::DefaultSubstituted => {
                write!(f, "all providers failed, using default")
            }
        }
    }
}

/// Result of one fallback-chain invocation. Created fresh per call and
/// never mutated after return.
#[derive(Debug, Clone)]
pub struct FallbackOutcome<T> {
    /// The recovered payload, or the configured default.
    pub data: T,
    /// Provider that produced `data`; nominal when `used_default` is set.
    pub provider_used: String,
    /// Whether the default value was substituted.
    pub used_default: bool,
    /// One entry per configured provider, plus the final substitution
    /// entry when every provider was exhausted.
    pub attempt_log: Vec<AttemptRecord>,
}

impl<T> FallbackOutcome<T> {
    /// Number of attempts that failed.
    pub fn failed_attempts(&self) -> usize {
        self.attempt_log
            .iter()
            .filter(|a| matches!(a.status, AttemptStatus::Failed(_)))
            .count()
    }

    /// Human-readable one-line-per-attempt summary.
    pub fn attempt_summary(&self) -> Vec<String> {
        self.attempt_log.iter().map(|a| a.to_string()).collect()
    }
}

/// Configuration for fallback execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfig {
    /// Deadline applied to each provider invocation, in milliseconds.
    /// Expiry counts as an ordinary failed attempt and the chain advances
    /// to the next provider. `None` lets every invocation run to
    /// completion.
    #[serde(default)]
    pub attempt_deadline_ms: Option<u64>,
}

/// Ordered fallback execution over provider attempts.
///
/// Providers are always attempted strictly in configured order; this is
/// a sequential chain, not a concurrent one.
#[derive(Debug, Clone, Default)]
pub struct FallbackChain {
    config: FallbackConfig,
}

impl FallbackChain {
    /// Create a chain with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chain with the given configuration.
    pub fn with_config(config: FallbackConfig) -> Self {
        Self { config }
    }

    /// Try each provider in order until one succeeds.
    ///
    /// Never fails: when every attempt is skipped or fails, the default
    /// value is returned, `used_default` is set, and the final log entry
    /// records the substitution.
    pub async fn call_with_fallback<T>(
        &self,
        label: &str,
        attempts: Vec<ProviderAttempt<T>>,
        default_value: T,
    ) -> FallbackOutcome<T> {
        let mut log = Vec::with_capacity(attempts.len() + 1);

        for attempt in attempts {
            let provider_id = attempt.provider_id.clone();

            if !attempt.available {
                debug!("[{}] provider {} skipped: unavailable", label, provider_id);
                log.push(AttemptRecord::skipped(&provider_id));
                continue;
            }

            let started = Instant::now();
            let invocation = (attempt.invoke)();
            let result = match self.config.attempt_deadline_ms {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), invocation).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::DeadlineExceeded(ms)),
                },
                None => invocation.await,
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(data) => {
                    info!(
                        "[{}] provider {} succeeded in {}ms",
                        label, provider_id, duration_ms
                    );
                    log.push(AttemptRecord::success(&provider_id, duration_ms));
                    return FallbackOutcome {
                        data,
                        provider_used: provider_id,
                        used_default: false,
                        attempt_log: log,
                    };
                }
                Err(error) => {
                    warn!(
                        "[{}] provider {} failed: {} (advancing to next)",
                        label, provider_id, error
                    );
                    log.push(AttemptRecord::failed(&provider_id, error.to_string(), duration_ms));
                }
            }
        }

        warn!("[{}] all providers failed, using default value", label);
        log.push(AttemptRecord::default_substituted());
        FallbackOutcome {
            data: default_value,
            provider_used: DEFAULT_PROVIDER.to_string(),
            used_default: true,
            attempt_log: log,
        }
    }
}
