//! Outbound seam between the core and the transport.

use crate::mode::FormatHint;
use crate::types::ConversationId;
use async_trait::async_trait;

/// Delivers replies to a conversation.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, id: &ConversationId, text: &str, format: FormatHint) -> anyhow::Result<()>;
}
