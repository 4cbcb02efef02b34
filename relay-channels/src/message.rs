//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// Inbound text message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Conversation identifier (Telegram chat ID, "cli", ...)
    pub chat_id: String,
    /// Sender identifier
    pub user_id: String,
    /// Message text
    pub text: String,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID assigned on receipt
    #[serde(default)]
    pub trace_id: String,
}

/// A slash command parsed out of a message: `/name[@bot] [argument]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercased command name without the slash or bot suffix
    pub name: String,
    /// Trimmed text after the command, if any
    pub argument: Option<String>,
}

impl ChannelMessage {
    /// Parse the message as a slash command.
    ///
    /// Returns `None` for ordinary text. Arguments are whitespace-normalized
    /// the way Telegram clients split them.
    pub fn command(&self) -> Option<Command> {
        let text = self.text.trim_start();
        let rest = text.strip_prefix('/')?;

        let mut parts = rest.split_whitespace();
        let head = parts.next()?;
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }

        let argument = parts.collect::<Vec<_>>().join(" ");
        Some(Command {
            name: name.to_ascii_lowercase(),
            argument: (!argument.is_empty()).then_some(argument),
        })
    }
}

/// Outgoing message to send to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target conversation ID
    pub chat_id: String,
    /// Message content
    pub content: OutgoingContent,
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text, sent verbatim
    Text { text: String },
    /// Markdown text, rendered as rich markup where the channel supports it
    Markup { text: String },
}

impl OutgoingContent {
    /// The raw text regardless of format.
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text } | Self::Markup { text } => text,
        }
    }
}
