//! Mode state machine and per-mode behaviors.
//!
//! Transitions happen only through entry commands. Every completion failure is
//! absorbed here and turned into the mode's apology, so nothing above the
//! router ever sees an [`InvokeError`](crate::invoker::InvokeError).

use crate::context::ContextStore;
use crate::invoker::CompletionInvoker;
use crate::mode::{FormatHint, Mode};
use crate::reply::ReplySink;
use crate::types::{ChatMessage, ConversationId};
use std::sync::Arc;

/// Sent by `/start`.
pub const WELCOME_TEXT: &str = "Welcome! You're in advice mode: send me your dating questions. \
Use /sentiment to analyze a message or /rizz for flirty replies.";

/// Sent by `/reset`.
pub const RESET_TEXT: &str = "Conversation history cleared.";

/// Sent by `/help`.
pub const HELP_TEXT: &str = "Commands:\n\
/sentiment <text> - analyze the sentiment of a message\n\
/advice <question> - get dating advice\n\
/rizz <message> - get a flirty reply\n\
/reset - forget the current conversation\n\
/help - show this message";

/// Mutable per-conversation state, guarded by the dispatcher's lock.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversationState {
    /// Current mode; `None` until the first entry command.
    pub mode: Option<Mode>,
}

/// Routes conversation events to the behavior of the current mode.
pub struct ModeRouter {
    contexts: ContextStore,
    analysis: CompletionInvoker,
    conversation: CompletionInvoker,
    sink: Arc<dyn ReplySink>,
}

impl ModeRouter {
    /// `analysis` serves sentiment requests; `conversation` is shared by advice and rizz.
    pub fn new(
        contexts: ContextStore,
        analysis: CompletionInvoker,
        conversation: CompletionInvoker,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            contexts,
            analysis,
            conversation,
            sink,
        }
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    /// Switch `state` to `mode`, dispatch inline text if any, then acknowledge.
    ///
    /// Contexts of the other stateful modes are discarded; the entered mode's
    /// own history is kept.
    pub async fn enter(
        &self,
        id: &ConversationId,
        state: &mut ConversationState,
        mode: Mode,
        inline_text: Option<&str>,
    ) {
        let previous = state.mode.replace(mode);
        self.contexts.reset_all_except(id, Some(mode));

        tracing::info!(
            conversation_id = %id,
            mode = %mode,
            previous = previous.map_or("none", Mode::as_str),
            "Entered mode"
        );

        if let Some(text) = inline_text.map(str::trim).filter(|t| !t.is_empty()) {
            self.dispatch(id, mode, text).await;
        }

        self.reply(id, mode.entry_acknowledgement(), FormatHint::Plain)
            .await;
    }

    /// `/start`: advice mode with every stored context cleared.
    pub async fn start(&self, id: &ConversationId, state: &mut ConversationState) {
        state.mode = Some(Mode::Advice);
        self.contexts.reset_all_except(id, None);

        tracing::info!(conversation_id = %id, "Conversation started");
        self.reply(id, WELCOME_TEXT, FormatHint::RichMarkup).await;
    }

    /// `/reset`: forget the current mode's history.
    pub async fn reset(&self, id: &ConversationId, state: &ConversationState) {
        if let Some(mode) = state.mode {
            self.contexts.reset(id, mode);
            tracing::info!(conversation_id = %id, mode = %mode, "Context reset");
        }
        self.reply(id, RESET_TEXT, FormatHint::Plain).await;
    }

    pub async fn help(&self, id: &ConversationId) {
        self.reply(id, HELP_TEXT, FormatHint::Plain).await;
    }

    /// Run `mode`'s behavior for `text`. Never changes the mode.
    pub async fn dispatch(&self, id: &ConversationId, mode: Mode, text: &str) {
        if let Some(notice) = mode.processing_notice() {
            self.reply(id, notice, FormatHint::Plain).await;
        }

        match mode {
            Mode::Analysis => self.analyze(id, text).await,
            Mode::Advice | Mode::Rizz => self.converse(id, mode, text).await,
        }
    }

    /// Send `text`, logging delivery failures instead of propagating them.
    pub async fn reply(&self, id: &ConversationId, text: &str, format: FormatHint) {
        if let Err(e) = self.sink.send(id, text, format).await {
            tracing::error!(conversation_id = %id, error = %e, "Failed to send reply");
        }
    }

    async fn analyze(&self, id: &ConversationId, text: &str) {
        let mode = Mode::Analysis;
        let messages = [
            ChatMessage::system(mode.system_prompt()),
            ChatMessage::user(text),
        ];

        match self.analysis.invoke(&messages).await {
            Ok(analysis) => {
                let label = mode.result_label().unwrap_or_default();
                self.reply(id, &format!("{label}\n{analysis}"), mode.format_hint())
                    .await;
            }
            Err(e) => {
                tracing::warn!(conversation_id = %id, mode = %mode, error = %e, "Analysis failed");
                self.reply(id, mode.apology(), FormatHint::Plain).await;
            }
        }
    }

    async fn converse(&self, id: &ConversationId, mode: Mode, text: &str) {
        let mut messages = self.contexts.get(id, mode);
        messages.push(ChatMessage::user(text));

        match self.conversation.invoke(&messages).await {
            Ok(reply) => {
                self.contexts.append_user(id, mode, text);
                self.contexts.append_assistant(id, mode, reply.as_str());
                self.reply(id, &reply, mode.format_hint()).await;
            }
            Err(e) => {
                tracing::warn!(conversation_id = %id, mode = %mode, error = %e, "Completion failed");
                self.reply(id, mode.apology(), FormatHint::Plain).await;
            }
        }
    }
}
