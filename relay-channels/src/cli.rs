//! CLI channel adapter for interactive terminal sessions.
//!
//! Provides a simple stdin/stdout based channel for local testing and development.
//! Every line typed is one message in the single conversation `"cli"`.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelResult};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Conversation id used for every CLI message.
pub const CLI_CHAT_ID: &str = "cli";

/// CLI channel - stdin/stdout, always available.
pub struct CliChannel;

impl CliChannel {
    /// Create a new CLI channel.
    pub const fn new() -> Self {
        Self
    }

    fn message(line: String) -> ChannelMessage {
        ChannelMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type: ChannelType::Cli,
            chat_id: CLI_CHAT_ID.to_string(),
            user_id: "user".to_string(),
            text: line,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            trace_id: relay_common::logging::generate_trace_id(),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward non-empty lines from `reader` until EOF, `/quit` or `/exit`.
async fn forward_lines<R>(reader: R, tx: &mpsc::Sender<ChannelMessage>) -> ChannelResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        if tx.send(CliChannel::message(line)).await.is_err() {
            break;
        }
    }

    Ok(())
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<()> {
        println!("{}", message.content.text());
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        forward_lines(BufReader::new(io::stdin()), &tx).await
    }
}
