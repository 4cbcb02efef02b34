//! Relay Channels - Channel adapters for the Relay bot.
//!
//! This crate provides adapters for the messaging channels the relay talks to:
//! - Telegram (Bot API long polling)
//! - CLI (for local testing)
//!
//! ## Architecture
//!
//! Channels push inbound messages onto a shared mpsc bus and accept outgoing
//! replies through [`Channel::send`].
//!
//! ```text
//! User IM → getUpdates → TelegramChannel → bus → dispatcher
//!                                                    ↓
//! User ←── sendMessage ←── TelegramChannel ←──── reply
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod message;
pub mod supervisor;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use cli::CliChannel;
pub use message::{ChannelMessage, ChannelType, Command, OutgoingContent, OutgoingMessage};
pub use supervisor::spawn_supervised_listener;
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};
