//! One completion call with placeholder detection and bounded retries.
//!
//! Providers behind aggregator APIs occasionally answer with stub content (a
//! tool-call echo instead of text). The invoker treats such replies exactly like
//! transport failures: log, try again, and give up after `max_attempts`.

use crate::provider::{ModelBinding, ProviderError};
use crate::types::ChatMessage;
use std::sync::Arc;
use std::time::Duration;

/// Default placeholder sentinel.
pub const DEFAULT_PLACEHOLDER_MARKER: &str = "<tool_response>";

/// Upper bound for the delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Decides whether a structurally successful completion is usable.
pub trait ResponseValidator: Send + Sync {
    fn is_invalid_response(&self, text: &str) -> bool;
}

/// Flags text containing any configured marker, or blank text.
#[derive(Debug, Clone)]
pub struct PlaceholderDetector {
    markers: Vec<String>,
}

impl PlaceholderDetector {
    pub fn new(markers: Vec<String>) -> Self {
        let markers = markers.into_iter().filter(|m| !m.is_empty()).collect();
        Self { markers }
    }
}

impl Default for PlaceholderDetector {
    fn default() -> Self {
        Self::new(vec![DEFAULT_PLACEHOLDER_MARKER.to_string()])
    }
}

impl ResponseValidator for PlaceholderDetector {
    fn is_invalid_response(&self, text: &str) -> bool {
        text.trim().is_empty() || self.markers.iter().any(|m| text.contains(m.as_str()))
    }
}

/// Why a single attempt did not produce a usable reply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptFailure {
    #[error("provider error: {0}")]
    ProviderTransport(#[from] ProviderError),

    #[error("placeholder response")]
    PlaceholderResponse,
}

/// Terminal failure of [`CompletionInvoker::invoke`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvokeError {
    #[error("completion failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last: Option<AttemptFailure>,
    },
}

/// Retry policy for [`CompletionInvoker`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    /// Delay before the second attempt, doubling afterwards. Zero retries immediately.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Runs completions for one model binding.
#[derive(Clone)]
pub struct CompletionInvoker {
    binding: ModelBinding,
    validator: Arc<dyn ResponseValidator>,
    policy: RetryPolicy,
}

impl CompletionInvoker {
    pub fn new(binding: ModelBinding, validator: Arc<dyn ResponseValidator>, policy: RetryPolicy) -> Self {
        Self {
            binding,
            validator,
            policy,
        }
    }

    /// Invoker with the default placeholder detector and retry policy.
    pub fn with_defaults(binding: ModelBinding) -> Self {
        Self::new(binding, Arc::new(PlaceholderDetector::default()), RetryPolicy::default())
    }

    pub fn model(&self) -> &str {
        &self.binding.model
    }

    /// Return the first usable completion for `messages`.
    pub async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, InvokeError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last = None;

        for attempt in 1..=max_attempts {
            match self.binding.complete(messages).await {
                Ok(text) if self.validator.is_invalid_response(&text) => {
                    tracing::warn!(
                        model = %self.binding.model,
                        attempt,
                        max_attempts,
                        "Received placeholder response"
                    );
                    last = Some(AttemptFailure::PlaceholderResponse);
                }
                Ok(text) => {
                    if attempt > 1 {
                        tracing::info!(
                            model = %self.binding.model,
                            attempt,
                            "Completion recovered after retries"
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(
                        model = %self.binding.model,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Completion call failed"
                    );
                    last = Some(AttemptFailure::ProviderTransport(e));
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_delay(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::error!(
            model = %self.binding.model,
            attempts = max_attempts,
            "Completion attempts exhausted"
        );
        Err(InvokeError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}
