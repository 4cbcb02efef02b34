//! Per-conversation minimum-interval throttle.
//!
//! Each conversation may have one accepted event per `min_interval`. Records are
//! kept for the life of the process.

use crate::types::ConversationId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum-interval gate keyed by conversation.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    last_allowed: DashMap<ConversationId, Instant>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_allowed: DashMap::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Accept an event at `now` if the conversation is not throttled.
    ///
    /// On acceptance `now` becomes the last-allowed time; on rejection the
    /// record is left untouched.
    pub fn allow(&self, id: &ConversationId, now: Instant) -> bool {
        let last = match self.last_allowed.entry(id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                return true;
            }
            Entry::Occupied(mut occupied) => {
                let last = *occupied.get();
                if now.saturating_duration_since(last) >= self.min_interval {
                    occupied.insert(now);
                    return true;
                }
                last
            }
        };

        tracing::debug!(
            conversation_id = %id,
            since_last_ms = now.saturating_duration_since(last).as_millis() as u64,
            "Rate gate rejected event"
        );
        false
    }

    /// Let the next event at or after `now` through.
    pub fn seed(&self, id: &ConversationId, now: Instant) {
        match now.checked_sub(self.min_interval) {
            Some(earlier) => {
                self.last_allowed.insert(id.clone(), earlier);
            }
            None => {
                self.last_allowed.remove(id);
            }
        }
    }
}
