//! The seam between the relay and a chat transport.

use crate::message::{ChannelMessage, OutgoingMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Credentials rejected; polling again will not help
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// A reply could not be delivered
    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Channel not ready")]
    NotReady,

    /// Flood control; the server asked for a pause of this many seconds
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),
}

impl ChannelError {
    /// Whether the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Auth(_))
    }
}

/// A chat transport: delivers inbound text to the bus and sends replies back.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver one reply to `message.chat_id`.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<()>;

    /// Push inbound messages onto `tx` until it closes or the source ends.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>;

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }
}
