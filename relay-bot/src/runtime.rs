//! Service runtime: wires configuration, channels and the dispatcher together.

use crate::context::ContextStore;
use crate::dispatcher::{InboundEvent, SessionDispatcher};
use crate::gate::RateGate;
use crate::invoker::{CompletionInvoker, PlaceholderDetector, RetryPolicy};
use crate::mode::FormatHint;
use crate::provider::{ModelBinding, OpenRouterProvider, Provider};
use crate::reply::ReplySink;
use crate::router::ModeRouter;
use crate::types::ConversationId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use relay_channels::{
    spawn_supervised_listener, Channel, ChannelMessage, CliChannel, OutgoingContent, OutgoingMessage,
    TelegramChannel,
};
use relay_common::config::{Config, ProviderConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the inbound message bus.
const BUS_CAPACITY: usize = 100;

const LISTENER_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const LISTENER_MAX_BACKOFF: Duration = Duration::from_secs(60);

// ============================================================================
// Reply Sink
// ============================================================================

/// Sends replies through a channel, addressing the chat by conversation id.
pub struct ChannelReplySink {
    channel: Arc<dyn Channel>,
}

impl ChannelReplySink {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ReplySink for ChannelReplySink {
    async fn send(&self, id: &ConversationId, text: &str, format: FormatHint) -> Result<()> {
        let content = match format {
            FormatHint::Plain => OutgoingContent::Text {
                text: text.to_string(),
            },
            FormatHint::RichMarkup => OutgoingContent::Markup {
                text: text.to_string(),
            },
        };

        self.channel
            .send(OutgoingMessage {
                chat_id: id.to_string(),
                content,
            })
            .await
            .with_context(|| format!("{} send failed", self.channel.name()))
    }
}

// ============================================================================
// Event Conversion
// ============================================================================

/// Classify a channel message as a command or free text.
pub fn to_event(message: &ChannelMessage) -> InboundEvent {
    match message.command() {
        Some(command) => InboundEvent::Command {
            name: command.name,
            argument: command.argument,
        },
        None => InboundEvent::Text {
            text: message.text.clone(),
        },
    }
}

// ============================================================================
// Assembly
// ============================================================================

fn invoker(provider: &ProviderConfig, binding: &relay_common::ModelBinding, role: &str) -> Result<CompletionInvoker> {
    let api_key = binding
        .api_key
        .clone()
        .with_context(|| format!("missing API key for the {role} model"))?;
    let model = binding
        .model
        .clone()
        .with_context(|| format!("missing model id for the {role} model"))?;

    let client: Arc<dyn Provider> = Arc::new(OpenRouterProvider::with_options(
        api_key,
        &provider.base_url,
        Duration::from_secs(provider.timeout_secs),
    ));

    let policy = RetryPolicy {
        max_attempts: provider.max_attempts,
        base_backoff: Duration::from_millis(provider.retry_backoff_ms),
    };

    Ok(CompletionInvoker::new(
        ModelBinding::new(client, model),
        Arc::new(PlaceholderDetector::new(provider.placeholder_markers.clone())),
        policy,
    ))
}

/// Build a dispatcher from configuration, replying through `sink`.
pub fn build_dispatcher(config: &Config, sink: Arc<dyn ReplySink>) -> Result<Arc<SessionDispatcher>> {
    let analysis = invoker(&config.provider, &config.provider.analysis, "analysis")?;
    let conversation = invoker(&config.provider, &config.provider.conversation, "conversation")?;

    tracing::info!(
        analysis_model = analysis.model(),
        conversation_model = conversation.model(),
        max_attempts = config.provider.max_attempts,
        min_interval_secs = config.dispatcher.min_interval_secs,
        max_history_messages = config.dispatcher.max_history_messages,
        worker_idle_secs = config.dispatcher.worker_idle_secs,
        "Dispatcher configured"
    );

    let router = ModeRouter::new(
        ContextStore::new(config.dispatcher.max_history_messages),
        analysis,
        conversation,
        sink,
    );
    let gate = RateGate::new(Duration::from_secs(config.dispatcher.min_interval_secs));

    Ok(Arc::new(
        SessionDispatcher::new(router, gate)
            .with_worker_idle_timeout(Duration::from_secs(config.dispatcher.worker_idle_secs)),
    ))
}

// ============================================================================
// Event Loop
// ============================================================================

/// Feed bus messages to the dispatcher until the bus closes or `shutdown` fires.
pub async fn run_bus<F>(
    mut rx: mpsc::Receiver<ChannelMessage>,
    dispatcher: &Arc<SessionDispatcher>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else {
                    tracing::info!("Message bus closed");
                    break;
                };

                tracing::debug!(
                    trace_id = %message.trace_id,
                    channel = message.channel_type.as_str(),
                    chat_id = %message.chat_id,
                    "Dispatching message"
                );

                let event = to_event(&message);
                dispatcher.submit(ConversationId::new(message.chat_id), event);
            }
            () = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Run the Telegram bot until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let token = config
        .telegram
        .bot_token
        .clone()
        .context("missing Telegram bot token")?;

    let telegram = TelegramChannel::new(token, config.telegram.allowed_users.clone())
        .with_api_base(config.telegram.api_base.as_str())
        .with_poll_timeout(config.telegram.poll_timeout_secs);

    if let Err(e) = telegram.health_check().await {
        tracing::warn!(error = %e, "Telegram health check failed; polling anyway");
    }

    let channel: Arc<dyn Channel> = Arc::new(telegram);
    let dispatcher = build_dispatcher(config, Arc::new(ChannelReplySink::new(Arc::clone(&channel))))?;

    let (tx, rx) = mpsc::channel(BUS_CAPACITY);
    let listener = spawn_supervised_listener(
        Arc::clone(&channel),
        tx,
        LISTENER_INITIAL_BACKOFF,
        LISTENER_MAX_BACKOFF,
    );

    tracing::info!("Relay bot listening on Telegram");
    run_bus(rx, &dispatcher, ctrl_c()).await;

    listener.abort();
    dispatcher.drain().await;
    tracing::info!("Relay bot stopped");
    Ok(())
}

/// Run an interactive session on stdin/stdout until EOF, `/quit` or Ctrl-C.
pub async fn cli(config: &Config) -> Result<()> {
    let channel: Arc<dyn Channel> = Arc::new(CliChannel::new());
    let dispatcher = build_dispatcher(config, Arc::new(ChannelReplySink::new(Arc::clone(&channel))))?;

    let (tx, rx) = mpsc::channel(BUS_CAPACITY);
    let listener = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            if let Err(e) = channel.listen(tx).await {
                tracing::error!(error = %e, "CLI channel failed");
            }
        })
    };

    println!("Relay CLI - start with /sentiment, /advice or /rizz; /help lists commands, /quit exits.");
    run_bus(rx, &dispatcher, ctrl_c()).await;

    listener.abort();
    dispatcher.drain().await;
    Ok(())
}
