//! OpenRouter provider.
//!
//! OpenRouter provides unified access to multiple LLM providers through a single
//! OpenAI-compatible API. Any server speaking the same `/chat/completions` wire
//! format can be targeted through `base_url`.

use super::{Provider, ProviderError};
use crate::types::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default OpenRouter API root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter provider for multi-model access.
pub struct OpenRouterProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(api_key, DEFAULT_BASE_URL, Duration::from_secs(120))
    }

    /// Create a provider for an OpenAI-compatible endpoint with a request timeout.
    pub fn with_options(api_key: impl Into<String>, base_url: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn error(&self, model: &str, message: impl Into<String>) -> ProviderError {
        ProviderError::new(self.name(), model, message)
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "Relay")
            .json(&OpenRouterRequest { model, messages })
            .send()
            .await
            .map_err(|e| self.error(model, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self
                .error(model, format!("API error ({}): {}", status.as_u16(), error_text))
                .with_status(status.as_u16()));
        }

        let result: OpenRouterResponse = response
            .json()
            .await
            .map_err(|e| self.error(model, format!("Failed to parse response: {e}")))?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.error(model, "No response from OpenRouter"))?;

        tracing::debug!(
            provider = self.name(),
            model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            latency_ms = start.elapsed().as_millis() as u64,
            "Completion received"
        );

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are a dating coach."),
            ChatMessage::user("should I text first?"),
        ]
    }

    #[tokio::test]
    async fn sends_openai_wire_format() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "meta/llama-3",
                "messages": [
                    { "role": "system", "content": "You are a dating coach." },
                    { "role": "user", "content": "should I text first?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-1",
                "choices": [{
                    "message": { "role": "assistant", "content": "Yes, go for it." },
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_options("sk-test", &server.uri(), Duration::from_secs(5));
        let text = provider.complete("meta/llama-3", &messages()).await.unwrap();
        assert_eq!(text, "Yes, go for it.");
    }

    #[tokio::test]
    async fn http_error_carries_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("No auth credentials found"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_options("bad", &server.uri(), Duration::from_secs(5));
        let err = provider.complete("m", &messages()).await.unwrap_err();
        assert_eq!(err.status_code, Some(401));
        assert_eq!(err.provider, "openrouter");
        assert!(err.message.contains("No auth credentials found"));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_options("k", &server.uri(), Duration::from_secs(5));
        let err = provider.complete("m", &messages()).await.unwrap_err();
        assert!(err.message.contains("No response"));
        assert!(err.status_code.is_none());
    }

    #[tokio::test]
    async fn null_content_becomes_empty_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_options("k", &server.uri(), Duration::from_secs(5));
        assert_eq!(provider.complete("m", &messages()).await.unwrap(), "");
    }

    #[test]
    fn base_url_is_normalized() {
        let provider = OpenRouterProvider::with_options("k", "http://localhost:9000/v1/", Duration::from_secs(1));
        assert_eq!(provider.base_url, "http://localhost:9000/v1");
        assert_eq!(OpenRouterProvider::new("k").base_url, DEFAULT_BASE_URL);
    }
}
