//! Per-conversation, per-mode conversation history.
//!
//! Every stored sequence starts with the mode's system prompt followed by the
//! successful exchanges in append order. Only stateful modes store anything;
//! calls for [`Mode::Analysis`] see a fresh `[system]` sequence every time.

use crate::mode::Mode;
use crate::types::{ChatMessage, ConversationId, Role};
use dashmap::DashMap;

/// In-memory store of conversation contexts.
#[derive(Debug, Default)]
pub struct ContextStore {
    contexts: DashMap<(ConversationId, Mode), Vec<ChatMessage>>,
    /// Maximum non-system entries kept per context; `0` keeps everything.
    max_history: usize,
}

impl ContextStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            contexts: DashMap::new(),
            max_history,
        }
    }

    /// Snapshot of the context, creating it on first use.
    pub fn get(&self, id: &ConversationId, mode: Mode) -> Vec<ChatMessage> {
        if !mode.is_stateful() {
            return vec![ChatMessage::system(mode.system_prompt())];
        }

        self.contexts
            .entry((id.clone(), mode))
            .or_insert_with(|| vec![ChatMessage::system(mode.system_prompt())])
            .clone()
    }

    pub fn append_user(&self, id: &ConversationId, mode: Mode, text: impl Into<String>) {
        self.append(id, mode, ChatMessage::user(text));
    }

    pub fn append_assistant(&self, id: &ConversationId, mode: Mode, text: impl Into<String>) {
        self.append(id, mode, ChatMessage::assistant(text));
    }

    /// Drop the stored context. The next `get` re-seeds it.
    pub fn reset(&self, id: &ConversationId, mode: Mode) {
        self.contexts.remove(&(id.clone(), mode));
    }

    /// Reset every stateful mode except `keep`.
    pub fn reset_all_except(&self, id: &ConversationId, keep: Option<Mode>) {
        for mode in Mode::ALL {
            if mode.is_stateful() && Some(mode) != keep {
                self.reset(id, mode);
            }
        }
    }

    /// Number of stored entries, system prompt included; `0` when absent.
    pub fn len(&self, id: &ConversationId, mode: Mode) -> usize {
        self.contexts
            .get(&(id.clone(), mode))
            .map_or(0, |context| context.len())
    }

    fn append(&self, id: &ConversationId, mode: Mode, message: ChatMessage) {
        if !mode.is_stateful() {
            return;
        }

        let mut context = self
            .contexts
            .entry((id.clone(), mode))
            .or_insert_with(|| vec![ChatMessage::system(mode.system_prompt())]);
        context.push(message);

        let dropped = trim_history(&mut context, self.max_history);
        if dropped > 0 {
            tracing::debug!(
                conversation_id = %id,
                mode = %mode,
                dropped,
                "Trimmed conversation history"
            );
        }
    }
}

/// Keep at most `max` entries after the system prompt.
///
/// Whole leading entries are dropped until the first kept one is a user turn.
/// Returns the number of entries removed.
fn trim_history(context: &mut Vec<ChatMessage>, max: usize) -> usize {
    let turns = context.len().saturating_sub(1);
    if max == 0 || turns <= max {
        return 0;
    }

    let mut start = 1 + (turns - max);
    while start < context.len() && context[start].role != Role::User {
        start += 1;
    }

    let removed = start - 1;
    context.drain(1..start);
    removed
}
