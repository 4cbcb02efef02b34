//! Completion provider abstraction.
//!
//! The relay talks to OpenAI-compatible chat-completion APIs (OpenRouter by
//! default). A [`Provider`] is one credentialed client; the model is chosen per
//! call so one client can serve several bindings.

mod openrouter;

pub use openrouter::OpenRouterProvider;

use crate::types::ChatMessage;
use async_trait::async_trait;

/// A chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Run one completion and return the generated text.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{provider}:{model}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// A provider paired with the model it should run.
#[derive(Clone)]
pub struct ModelBinding {
    pub provider: std::sync::Arc<dyn Provider>,
    pub model: String,
}

impl ModelBinding {
    pub fn new(provider: std::sync::Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.provider.complete(&self.model, messages).await
    }
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}
