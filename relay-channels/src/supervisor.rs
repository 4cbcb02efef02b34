//! Supervised channel listeners.

use crate::message::ChannelMessage;
use crate::traits::Channel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Run `channel.listen` forever, restarting it with exponential backoff.
///
/// The task ends once the receiving side of `tx` is gone.
pub fn spawn_supervised_listener(
    channel: Arc<dyn Channel>,
    tx: mpsc::Sender<ChannelMessage>,
    initial_backoff: Duration,
    max_backoff: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let floor = initial_backoff.max(Duration::from_millis(10));
        let ceiling = max_backoff.max(floor);
        let mut backoff = floor;

        loop {
            let result = channel.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!(channel = channel.name(), "Channel exited unexpectedly; restarting");
                }
                Err(e) => {
                    tracing::error!(channel = channel.name(), error = %e, "Channel error; restarting");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(ceiling);
        }

        tracing::info!(channel = channel.name(), "Channel listener stopped");
    })
}
