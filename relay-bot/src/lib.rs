//! Relay Bot - multi-mode conversational relay.
//!
//! Conversations opt into one of three modes with an entry command and every
//! following text message is answered by an OpenAI-compatible completion model:
//!
//! - `/sentiment` - stateless sentiment analysis
//! - `/advice` - dating advice with per-conversation history
//! - `/rizz` - short flirtatious replies with per-conversation history
//!
//! ## Architecture
//!
//! ```text
//! Channel::listen → bus → SessionDispatcher::submit → conversation worker
//!                                                         ↓
//!                          RateGate → ModeRouter → ContextStore + CompletionInvoker
//!                                                         ↓
//! Channel::send ←──────────────── ReplySink ←─────────── reply
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod context;
pub mod dispatcher;
pub mod gate;
pub mod invoker;
pub mod mode;
pub mod provider;
pub mod reply;
pub mod router;
pub mod runtime;
pub mod types;

// Re-export commonly used types
pub use context::ContextStore;
pub use dispatcher::{DispatchOutcome, InboundEvent, SessionDispatcher};
pub use gate::RateGate;
pub use invoker::{
    AttemptFailure, CompletionInvoker, InvokeError, PlaceholderDetector, ResponseValidator, RetryPolicy,
};
pub use mode::{FormatHint, Mode};
pub use provider::{ModelBinding, OpenRouterProvider, Provider, ProviderError};
pub use reply::ReplySink;
pub use router::{ConversationState, ModeRouter};
pub use types::{ChatMessage, ConversationId, Role};
