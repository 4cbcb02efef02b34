//! Session dispatcher behavior with scripted providers and a recording sink.
//!
//! Time-dependent tests run on tokio's paused clock and move it with
//! `tokio::time::advance`.

use async_trait::async_trait;
use relay_bot::{
    ChatMessage, CompletionInvoker, ContextStore, ConversationId, DispatchOutcome, FormatHint, InboundEvent,
    Mode, ModeRouter, ModelBinding, Provider, ProviderError, RateGate, ReplySink, SessionDispatcher,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test doubles
// ============================================================================

/// Records every call; answers from a script, then with `reply <n>`.
#[derive(Default)]
struct MockProvider {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    always_placeholder: bool,
}

impl MockProvider {
    fn placeholder_only() -> Self {
        Self {
            always_placeholder: true,
            ..Self::default()
        }
    }

    fn push(&self, result: Result<String, ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            calls.len()
        };

        if self.always_placeholder {
            return Ok("<tool_response>".to_string());
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("reply {n}")))
    }
}

/// Sleeps for the number of milliseconds given as the user text, then echoes it.
struct SlowEchoProvider;

#[async_trait]
impl Provider for SlowEchoProvider {
    fn name(&self) -> &str {
        "slow-echo"
    }

    async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let text = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let millis = text.parse::<u64>().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(format!("echo {text}"))
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(ConversationId, String, FormatHint)>>,
}

impl RecordingSink {
    fn texts_for(&self, id: &ConversationId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _, _)| to == id)
            .map(|(_, text, _)| text.clone())
            .collect()
    }

    fn all(&self) -> Vec<(ConversationId, String, FormatHint)> {
        self.sent.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, id: &ConversationId, text: &str, format: FormatHint) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((id.clone(), text.to_string(), format));
        Ok(())
    }
}

struct Harness {
    dispatcher: Arc<SessionDispatcher>,
    analysis: Arc<MockProvider>,
    conversation: Arc<MockProvider>,
    sink: Arc<RecordingSink>,
}

fn build(analysis: Arc<dyn Provider>, conversation: Arc<dyn Provider>, sink: Arc<RecordingSink>) -> Arc<SessionDispatcher> {
    let router = ModeRouter::new(
        ContextStore::new(0),
        CompletionInvoker::with_defaults(ModelBinding::new(analysis, "analysis-model")),
        CompletionInvoker::with_defaults(ModelBinding::new(conversation, "conversation-model")),
        sink,
    );
    Arc::new(SessionDispatcher::new(router, RateGate::new(Duration::from_secs(5))))
}

fn harness_with(conversation: MockProvider) -> Harness {
    let analysis = Arc::new(MockProvider::default());
    let conversation = Arc::new(conversation);
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = build(analysis.clone(), conversation.clone(), sink.clone());

    Harness {
        dispatcher,
        analysis,
        conversation,
        sink,
    }
}

fn harness() -> Harness {
    harness_with(MockProvider::default())
}

fn id(raw: &str) -> ConversationId {
    ConversationId::from(raw)
}

fn cmd(name: &str, argument: Option<&str>) -> InboundEvent {
    InboundEvent::command(name, argument)
}

fn text(text: &str) -> InboundEvent {
    InboundEvent::text(text)
}

async fn advance(secs: f64) {
    tokio::time::advance(Duration::from_secs_f64(secs)).await;
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn advice_entry_then_question() {
    let h = harness();
    let c = id("100");

    let outcome = h.dispatcher.handle(&c, cmd("advice", None)).await;
    assert_eq!(outcome, DispatchOutcome::ModeEntered(Mode::Advice));
    assert_eq!(
        h.sink.texts_for(&c),
        vec!["Now in advice mode. Please send your dating questions or advice requests."]
    );
    assert_eq!(h.conversation.call_count(), 0);

    advance(0.5).await;
    let outcome = h.dispatcher.handle(&c, text("should I text first?")).await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    assert_eq!(
        h.conversation.calls(),
        vec![vec![
            ChatMessage::system(Mode::Advice.system_prompt()),
            ChatMessage::user("should I text first?"),
        ]]
    );
    assert_eq!(h.dispatcher.router().contexts().len(&c, Mode::Advice), 3);

    let sent = h.sink.all();
    assert_eq!(sent[1].1, "processing advice...");
    assert_eq!(sent[2].1, "reply 1");
    assert_eq!(sent[2].2, FormatHint::RichMarkup);
}

#[tokio::test(start_paused = true)]
async fn second_message_within_interval_is_throttled() {
    let h = harness();
    let c = id("101");

    h.dispatcher.handle(&c, cmd("rizz", None)).await;
    advance(1.0).await;
    assert_eq!(h.dispatcher.handle(&c, text("hey")).await, DispatchOutcome::Handled);
    let context_before = h.dispatcher.router().contexts().get(&c, Mode::Rizz);
    h.sink.clear();

    advance(2.0).await;
    assert_eq!(h.dispatcher.handle(&c, text("you there?")).await, DispatchOutcome::Throttled);

    assert_eq!(h.conversation.call_count(), 1);
    assert_eq!(h.dispatcher.router().contexts().get(&c, Mode::Rizz), context_before);
    assert_eq!(h.sink.texts_for(&c), vec!["Please wait 5 seconds between responses."]);

    advance(3.0).await;
    assert_eq!(h.dispatcher.handle(&c, text("you there?")).await, DispatchOutcome::Handled);
}

#[tokio::test(start_paused = true)]
async fn text_without_mode_is_ignored() {
    let h = harness();
    let c = id("102");

    assert_eq!(h.dispatcher.handle(&c, text("hello?")).await, DispatchOutcome::Ignored);
    assert!(h.sink.all().is_empty());
    assert_eq!(h.analysis.call_count() + h.conversation.call_count(), 0);
    assert_eq!(h.dispatcher.mode(&c).await, None);
}

#[tokio::test(start_paused = true)]
async fn unknown_command_is_ignored() {
    let h = harness();
    let c = id("103");

    assert_eq!(h.dispatcher.handle(&c, cmd("weather", Some("today"))).await, DispatchOutcome::Ignored);
    assert!(h.sink.all().is_empty());
}

// ============================================================================
// Mode behaviors
// ============================================================================

#[tokio::test(start_paused = true)]
async fn sentiment_inline_text_runs_before_acknowledgement() {
    let h = harness();
    let c = id("200");
    h.analysis.push(Ok("Positive. Score: 8".into()));

    let outcome = h.dispatcher.handle(&c, cmd("sentiment", Some("what a great day"))).await;
    assert_eq!(outcome, DispatchOutcome::ModeEntered(Mode::Analysis));

    assert_eq!(
        h.analysis.calls(),
        vec![vec![
            ChatMessage::system(Mode::Analysis.system_prompt()),
            ChatMessage::user("what a great day"),
        ]]
    );
    assert_eq!(
        h.sink.texts_for(&c),
        vec![
            "processing...".to_string(),
            "Sentiment Analysis:\nPositive. Score: 8".to_string(),
            Mode::Analysis.entry_acknowledgement().to_string(),
        ]
    );
    assert_eq!(h.dispatcher.router().contexts().len(&c, Mode::Analysis), 0);
}

#[tokio::test(start_paused = true)]
async fn analyze_alias_and_statelessness() {
    let h = harness();
    let c = id("201");

    h.dispatcher.handle(&c, cmd("analyze", None)).await;
    assert_eq!(h.dispatcher.mode(&c).await, Some(Mode::Analysis));

    h.dispatcher.handle(&c, text("meh")).await;
    advance(5.0).await;
    h.dispatcher.handle(&c, text("awful")).await;

    let calls = h.analysis.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].len(), 2);
    assert_eq!(calls[1][1], ChatMessage::user("awful"));
}

#[tokio::test(start_paused = true)]
async fn rizz_replies_are_plain_without_notice() {
    let h = harness();
    let c = id("202");
    h.conversation.push(Ok("hey bby whatsup <3".into()));

    h.dispatcher.handle(&c, cmd("rizz", Some("hello"))).await;

    let sent = h.sink.all();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1, "hey bby whatsup <3");
    assert_eq!(sent[0].2, FormatHint::Plain);
    assert_eq!(sent[1].1, Mode::Rizz.entry_acknowledgement());
}

#[tokio::test(start_paused = true)]
async fn history_accumulates_across_turns() {
    let h = harness();
    let c = id("203");

    h.dispatcher.handle(&c, cmd("advice", Some("m1"))).await;
    advance(5.0).await;
    h.dispatcher.handle(&c, text("m2")).await;

    let calls = h.conversation.calls();
    assert_eq!(
        calls[1],
        vec![
            ChatMessage::system(Mode::Advice.system_prompt()),
            ChatMessage::user("m1"),
            ChatMessage::assistant("reply 1"),
            ChatMessage::user("m2"),
        ]
    );
    assert_eq!(h.dispatcher.router().contexts().len(&c, Mode::Advice), 5);
}

#[tokio::test(start_paused = true)]
async fn exhausted_completion_sends_apology_and_records_nothing() {
    let h = harness_with(MockProvider::placeholder_only());
    let c = id("204");

    h.dispatcher.handle(&c, cmd("advice", None)).await;
    h.sink.clear();
    let outcome = h.dispatcher.handle(&c, text("are you there?")).await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(h.conversation.call_count(), 3);
    assert_eq!(
        h.sink.texts_for(&c),
        vec![
            "processing advice...",
            "Sorry, an error occurred while seeking dating advice. Please try again later.",
        ]
    );
    assert_eq!(
        h.dispatcher.router().contexts().get(&c, Mode::Advice),
        vec![ChatMessage::system(Mode::Advice.system_prompt())]
    );
}

#[tokio::test(start_paused = true)]
async fn provider_errors_are_retried_then_recover() {
    let h = harness();
    let c = id("205");
    h.conversation
        .push(Err(ProviderError::new("mock", "conversation-model", "connection reset")));
    h.conversation.push(Ok("<tool_response>".into()));
    h.conversation.push(Ok("ILY too ;) wyd?".into()));

    h.dispatcher.handle(&c, cmd("rizz", Some("ily"))).await;

    assert_eq!(h.conversation.call_count(), 3);
    assert_eq!(h.sink.texts_for(&c)[0], "ILY too ;) wyd?");
    assert_eq!(h.dispatcher.router().contexts().len(&c, Mode::Rizz), 3);
}

// ============================================================================
// Mode switching and commands
// ============================================================================

#[tokio::test(start_paused = true)]
async fn switching_mode_discards_only_the_other_context() {
    let h = harness();
    let c = id("300");
    let contexts = || h.dispatcher.router().contexts();

    h.dispatcher.handle(&c, cmd("rizz", Some("hey"))).await;
    assert_eq!(contexts().len(&c, Mode::Rizz), 3);

    h.dispatcher.handle(&c, cmd("advice", Some("help"))).await;
    assert_eq!(contexts().len(&c, Mode::Rizz), 0);
    assert_eq!(contexts().len(&c, Mode::Advice), 3);
    assert_eq!(contexts().len(&c, Mode::Analysis), 0);

    // Re-entering the same mode keeps its history.
    h.dispatcher.handle(&c, cmd("advice", None)).await;
    assert_eq!(contexts().len(&c, Mode::Advice), 3);

    // Analysis has nothing to clear but still drops the others.
    h.dispatcher.handle(&c, cmd("sentiment", None)).await;
    assert_eq!(contexts().len(&c, Mode::Advice), 0);
}

#[tokio::test(start_paused = true)]
async fn entry_command_bypasses_and_seeds_the_gate() {
    let h = harness();
    let c = id("301");

    h.dispatcher.handle(&c, cmd("rizz", None)).await;
    assert_eq!(h.dispatcher.handle(&c, text("one")).await, DispatchOutcome::Handled);

    advance(1.0).await;
    assert_eq!(
        h.dispatcher.handle(&c, cmd("advice", None)).await,
        DispatchOutcome::ModeEntered(Mode::Advice)
    );
    assert_eq!(h.dispatcher.handle(&c, text("two")).await, DispatchOutcome::Handled);
    assert_eq!(h.dispatcher.handle(&c, text("three")).await, DispatchOutcome::Throttled);
}

#[tokio::test(start_paused = true)]
async fn start_enters_advice_and_clears_everything() {
    let h = harness();
    let c = id("302");

    h.dispatcher.handle(&c, cmd("advice", Some("q"))).await;
    assert_eq!(h.dispatcher.router().contexts().len(&c, Mode::Advice), 3);

    let outcome = h.dispatcher.handle(&c, cmd("start", None)).await;
    assert_eq!(outcome, DispatchOutcome::ModeEntered(Mode::Advice));
    assert_eq!(h.dispatcher.mode(&c).await, Some(Mode::Advice));
    assert_eq!(h.dispatcher.router().contexts().len(&c, Mode::Advice), 0);
    assert!(h.sink.texts_for(&c).last().unwrap().starts_with("Welcome"));

    assert_eq!(h.dispatcher.handle(&c, text("hi")).await, DispatchOutcome::Handled);
}

#[tokio::test(start_paused = true)]
async fn reset_clears_current_mode_and_is_idempotent() {
    let h = harness();
    let c = id("303");

    h.dispatcher.handle(&c, cmd("rizz", Some("hey"))).await;
    assert_eq!(h.dispatcher.handle(&c, cmd("reset", None)).await, DispatchOutcome::ContextReset);
    assert_eq!(h.dispatcher.handle(&c, cmd("reset", None)).await, DispatchOutcome::ContextReset);

    assert_eq!(h.dispatcher.mode(&c).await, Some(Mode::Rizz));
    assert_eq!(
        h.dispatcher.router().contexts().get(&c, Mode::Rizz),
        vec![ChatMessage::system(Mode::Rizz.system_prompt())]
    );
}

#[tokio::test(start_paused = true)]
async fn help_does_not_change_mode() {
    let h = harness();
    let c = id("304");

    assert_eq!(h.dispatcher.handle(&c, cmd("help", None)).await, DispatchOutcome::HelpShown);
    assert_eq!(h.dispatcher.mode(&c).await, None);
    assert!(h.sink.texts_for(&c)[0].contains("/sentiment"));
}

// ============================================================================
// Isolation and ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn conversations_do_not_affect_each_other() {
    let h = harness();
    let c1 = id("400");
    let c2 = id("401");

    h.dispatcher.handle(&c1, cmd("advice", None)).await;
    assert_eq!(h.dispatcher.handle(&c1, text("q1")).await, DispatchOutcome::Handled);
    let c1_context = h.dispatcher.router().contexts().get(&c1, Mode::Advice);

    advance(1.0).await;
    h.dispatcher.handle(&c2, cmd("advice", Some("other"))).await;
    assert_eq!(h.dispatcher.handle(&c2, text("more")).await, DispatchOutcome::Handled);
    h.dispatcher.handle(&c2, cmd("start", None)).await;
    h.dispatcher.handle(&c2, cmd("rizz", None)).await;

    assert_eq!(h.dispatcher.router().contexts().get(&c1, Mode::Advice), c1_context);

    // c1's gate still measures from its own last accepted message.
    advance(2.0).await;
    assert_eq!(h.dispatcher.handle(&c1, text("q2")).await, DispatchOutcome::Throttled);
    advance(2.0).await;
    assert_eq!(h.dispatcher.handle(&c1, text("q2")).await, DispatchOutcome::Handled);
}

#[tokio::test(start_paused = true)]
async fn submitted_events_keep_order_per_conversation() {
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = build(Arc::new(SlowEchoProvider), Arc::new(SlowEchoProvider), sink.clone());
    let slow = id("500");
    let fast = id("501");

    dispatcher.submit(slow.clone(), cmd("rizz", Some("300")));
    dispatcher.submit(slow.clone(), cmd("rizz", Some("10")));
    dispatcher.submit(fast.clone(), cmd("rizz", Some("0")));
    dispatcher.drain().await;

    let ack = Mode::Rizz.entry_acknowledgement();
    assert_eq!(sink.texts_for(&slow), vec!["echo 300", ack, "echo 10", ack]);
    assert_eq!(sink.texts_for(&fast), vec!["echo 0", ack]);

    // The fast conversation finished while the slow one was still waiting.
    let first_reply = &sink.all()[0];
    assert_eq!(first_reply.0, fast);
}

#[tokio::test(start_paused = true)]
async fn idle_workers_exit_and_are_recreated() {
    let sink = Arc::new(RecordingSink::default());
    let provider = Arc::new(MockProvider::default());
    let router = ModeRouter::new(
        ContextStore::new(0),
        CompletionInvoker::with_defaults(ModelBinding::new(provider.clone(), "analysis-model")),
        CompletionInvoker::with_defaults(ModelBinding::new(provider.clone(), "conversation-model")),
        sink.clone(),
    );
    let dispatcher = Arc::new(
        SessionDispatcher::new(router, RateGate::new(Duration::from_secs(5)))
            .with_worker_idle_timeout(Duration::from_secs(60)),
    );
    let c1 = id("600");

    dispatcher.submit(c1.clone(), cmd("advice", None));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(dispatcher.active_workers(), 1);

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(dispatcher.active_workers(), 0);

    // State outlives the worker.
    dispatcher.submit(c1.clone(), text("still there?"));
    dispatcher.drain().await;

    assert_eq!(dispatcher.mode(&c1).await, Some(Mode::Advice));
    assert_eq!(
        sink.texts_for(&c1),
        vec![
            Mode::Advice.entry_acknowledgement().to_string(),
            "processing advice...".to_string(),
            "reply 1".to_string(),
        ]
    );
}
