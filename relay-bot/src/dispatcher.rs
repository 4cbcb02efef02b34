//! Session dispatcher: the single entry point for conversation events.
//!
//! Events for one conversation are serialized by a per-conversation lock held
//! for the whole event, so the rate check, context read-modify-append and the
//! completion call never interleave. [`SessionDispatcher::submit`] additionally
//! gives every conversation its own worker task, keeping arrival order while
//! letting different conversations progress in parallel. A worker that stays
//! idle for the configured timeout exits and is recreated on the next event.

use crate::gate::RateGate;
use crate::mode::{FormatHint, Mode};
use crate::router::{ConversationState, ModeRouter};
use crate::types::ConversationId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long a conversation worker waits for a new event before exiting.
pub const DEFAULT_WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// An inbound conversation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `/name [argument]`
    Command {
        name: String,
        argument: Option<String>,
    },
    /// Any non-command text
    Text { text: String },
}

impl InboundEvent {
    pub fn command(name: impl Into<String>, argument: Option<&str>) -> Self {
        Self::Command {
            name: name.into(),
            argument: argument.map(str::to_string),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// What [`SessionDispatcher::handle`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Dropped without a reply (no mode yet, blank text, unknown command)
    Ignored,
    /// Rejected by the rate gate; the wait notice was sent
    Throttled,
    /// Free text processed by the current mode
    Handled,
    /// An entry command switched the conversation into this mode
    ModeEntered(Mode),
    /// `/reset` cleared the current mode's history
    ContextReset,
    /// `/help` was answered
    HelpShown,
}

/// Top-level orchestrator owning all per-conversation state.
pub struct SessionDispatcher {
    router: ModeRouter,
    gate: RateGate,
    states: DashMap<ConversationId, Arc<Mutex<ConversationState>>>,
    workers: DashMap<ConversationId, Worker>,
    worker_idle_timeout: Duration,
    next_generation: AtomicU64,
}

/// Queue and task of one conversation worker.
struct Worker {
    tx: mpsc::UnboundedSender<InboundEvent>,
    handle: JoinHandle<()>,
    generation: u64,
}

impl SessionDispatcher {
    pub fn new(router: ModeRouter, gate: RateGate) -> Self {
        Self {
            router,
            gate,
            states: DashMap::new(),
            workers: DashMap::new(),
            worker_idle_timeout: DEFAULT_WORKER_IDLE_TIMEOUT,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Let conversation workers exit after `timeout` without events.
    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    /// Number of conversations that currently have a worker task.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn router(&self) -> &ModeRouter {
        &self.router
    }

    /// Current mode of a conversation.
    pub async fn mode(&self, id: &ConversationId) -> Option<Mode> {
        let state = self.states.get(id).map(|s| Arc::clone(s.value()))?;
        let mode = state.lock().await.mode;
        mode
    }

    fn state(&self, id: &ConversationId) -> Arc<Mutex<ConversationState>> {
        Arc::clone(
            self.states
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ConversationState::default())))
                .value(),
        )
    }

    /// Handle one event to completion.
    pub async fn handle(&self, id: &ConversationId, event: InboundEvent) -> DispatchOutcome {
        let state = self.state(id);
        let mut state = state.lock().await;
        let now = Instant::now();

        match event {
            InboundEvent::Command { name, argument } => {
                self.handle_command(id, &mut state, &name, argument.as_deref(), now)
                    .await
            }
            InboundEvent::Text { text } => self.handle_text(id, &state, &text, now).await,
        }
    }

    async fn handle_command(
        &self,
        id: &ConversationId,
        state: &mut ConversationState,
        name: &str,
        argument: Option<&str>,
        now: Instant,
    ) -> DispatchOutcome {
        match name {
            "start" => {
                self.router.start(id, state).await;
                self.gate.seed(id, now);
                DispatchOutcome::ModeEntered(Mode::Advice)
            }
            "reset" => {
                self.router.reset(id, state).await;
                DispatchOutcome::ContextReset
            }
            "help" => {
                self.router.help(id).await;
                DispatchOutcome::HelpShown
            }
            other => match Mode::from_command(other) {
                Some(mode) => {
                    self.router.enter(id, state, mode, argument).await;
                    self.gate.seed(id, now);
                    DispatchOutcome::ModeEntered(mode)
                }
                None => {
                    tracing::debug!(conversation_id = %id, command = other, "Ignoring unknown command");
                    DispatchOutcome::Ignored
                }
            },
        }
    }

    async fn handle_text(
        &self,
        id: &ConversationId,
        state: &ConversationState,
        text: &str,
        now: Instant,
    ) -> DispatchOutcome {
        let Some(mode) = state.mode else {
            tracing::debug!(conversation_id = %id, "Ignoring text from conversation without a mode");
            return DispatchOutcome::Ignored;
        };

        let text = text.trim();
        if text.is_empty() {
            return DispatchOutcome::Ignored;
        }

        if !self.gate.allow(id, now) {
            let notice = format!(
                "Please wait {} seconds between responses.",
                self.gate.min_interval().as_secs()
            );
            self.router.reply(id, &notice, FormatHint::Plain).await;
            return DispatchOutcome::Throttled;
        }

        tracing::debug!(conversation_id = %id, mode = %mode, "Dispatching text");
        self.router.dispatch(id, mode, text).await;
        DispatchOutcome::Handled
    }

    /// Queue an event on the conversation's worker and return immediately.
    pub fn submit(self: &Arc<Self>, id: ConversationId, event: InboundEvent) {
        // Sending under the entry lock keeps an idle worker from retiring in between.
        let mut worker = self
            .workers
            .entry(id.clone())
            .or_insert_with(|| self.spawn_worker(id.clone()));

        let Err(mpsc::error::SendError(event)) = worker.tx.send(event) else {
            return;
        };

        *worker = self.spawn_worker(id.clone());
        if worker.tx.send(event).is_err() {
            tracing::error!(conversation_id = %id, "Dropping event: conversation worker unavailable");
        }
    }

    /// Close every worker queue and wait until queued events are handled.
    pub async fn drain(&self) {
        let ids: Vec<ConversationId> = self.workers.iter().map(|w| w.key().clone()).collect();

        for id in ids {
            if let Some((_, worker)) = self.workers.remove(&id) {
                drop(worker.tx);
                if let Err(e) = worker.handle.await {
                    tracing::error!(conversation_id = %id, error = %e, "Conversation worker panicked");
                }
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, id: ConversationId) -> Worker {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher: Weak<Self> = Arc::downgrade(self);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let idle_timeout = self.worker_idle_timeout;

        let handle = tokio::spawn(async move {
            tracing::debug!(conversation_id = %id, "Conversation worker started");
            loop {
                let event = match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(_) => {
                        let Some(dispatcher) = dispatcher.upgrade() else {
                            break;
                        };
                        let retired = dispatcher
                            .workers
                            .remove_if(&id, |_, w| w.generation == generation && rx.is_empty())
                            .is_some();
                        if retired {
                            tracing::debug!(conversation_id = %id, "Conversation worker idle");
                            break;
                        }
                        continue;
                    }
                };

                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                let outcome = dispatcher.handle(&id, event).await;
                tracing::debug!(conversation_id = %id, ?outcome, "Event handled");
            }
            tracing::debug!(conversation_id = %id, "Conversation worker stopped");
        });

        Worker {
            tx,
            handle,
            generation,
        }
    }
}
