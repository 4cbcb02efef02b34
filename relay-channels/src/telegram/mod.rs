//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending messages
//! through the Telegram Bot API.

pub mod format;

use crate::message::{ChannelMessage, ChannelType, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Telegram's per-message length limit.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Default Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

// ============================================================================
// Telegram Channel
// ============================================================================

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout_secs: 30,
            client: reqwest::Client::new(),
        }
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the `getUpdates` long-poll timeout in seconds.
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Turn one `getUpdates` entry into a channel message.
    ///
    /// Returns `None` for non-text updates and for senders outside the allow-list.
    fn parse_update(&self, update: &Value) -> Option<ChannelMessage> {
        let message = update.get("message")?;
        let text = message.get("text").and_then(Value::as_str)?;

        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?
            .to_string();

        let username = message
            .get("from")
            .and_then(|f| f.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let user_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string());

        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }

        if !self.is_any_user_allowed(identities.iter().copied()) {
            tracing::warn!(
                "Telegram: ignoring message from unauthorized user: {}",
                username
            );
            return None;
        }

        let id = message
            .get("message_id")
            .and_then(Value::as_i64)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string());

        Some(ChannelMessage {
            id,
            channel_type: ChannelType::Telegram,
            chat_id,
            user_id: user_id.unwrap_or_else(|| username.to_string()),
            text: text.to_string(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            trace_id: relay_common::logging::generate_trace_id(),
        })
    }

    async fn post_message(&self, body: &Value) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.api_url("sendMessage"))
            .json(body)
            .send()
            .await?)
    }

    /// Send a single chunk as plain text.
    async fn send_plain_chunk(&self, message: &str, chat_id: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message
        });

        let resp = self.post_message(&body).await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let error_text = resp.text().await.unwrap_or_default();
        anyhow::bail!("Telegram sendMessage failed: {error_text}")
    }

    /// Send a single chunk with HTML parsing, falling back to plain text.
    async fn send_html_chunk(&self, message: &str, chat_id: &str) -> anyhow::Result<()> {
        let converted = format::convert_to_telegram_html(message);

        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": converted,
            "parse_mode": "HTML"
        });

        let resp = self.post_message(&body).await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();

        // Telegram returns "Bad Request: can't parse entities" for HTML errors
        if status.as_u16() == 400 && error_text.contains("parse entities") {
            tracing::warn!(
                "Telegram HTML parsing failed, retrying without parse_mode: {}",
                error_text
            );
            return self.send_plain_chunk(message, chat_id).await;
        }

        anyhow::bail!("Telegram sendMessage failed: {error_text}")
    }

    /// Fetch one batch of updates starting at `offset`.
    async fn get_updates(&self, offset: i64) -> ChannelResult<Vec<Value>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"]
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Connection(format!("Telegram parse error ({status}): {e}")))?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) == Some(false) {
            if let Some(secs) = data.pointer("/parameters/retry_after").and_then(Value::as_u64) {
                return Err(ChannelError::RateLimited(secs));
            }
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::Connection(format!(
                "getUpdates failed ({status}): {description}"
            )));
        }

        Ok(data
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Split a message into chunks that fit within Telegram's limit.
///
/// Prefers paragraph, line, sentence and word boundaries, and never cuts
/// through a UTF-8 character.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        if limit == 0 {
            // A single character wider than max_len; emit it whole.
            limit = remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i);
        }

        let chunk = &remaining[..limit];
        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". ").map(|i| i + 1))
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        let actual_split = if split_pos == 0 { limit } else { split_pos };

        chunks.push(remaining[..actual_split].to_string());
        remaining = remaining[actual_split..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<()> {
        let markup = matches!(message.content, OutgoingContent::Markup { .. });

        for chunk in split_message(message.content.text(), MAX_MESSAGE_LEN) {
            let result = if markup {
                self.send_html_chunk(&chunk, &message.chat_id).await
            } else {
                self.send_plain_chunk(&chunk, &message.chat_id).await
            };
            result.map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }

        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        while !tx.is_closed() {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) if !e.is_transient() => return Err(e),
                Err(ChannelError::RateLimited(secs)) => {
                    tracing::warn!(retry_after = secs, "Telegram flood control on getUpdates");
                    tokio::time::sleep(Duration::from_secs(secs.max(1))).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(uid + 1);
                }

                let Some(msg) = self.parse_update(update) else {
                    continue;
                };

                tracing::info!(
                    trace_id = %msg.trace_id,
                    message_id = %msg.id,
                    chat_id = %msg.chat_id,
                    user_id = %msg.user_id,
                    "Telegram message received"
                );

                if tx.send(msg).await.is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }
}
