//! Trade-event sink port.
//!
//! The real deployment publishes to the `trade.events` topic; the in-memory
//! sink backs tests and single-process runs. Both are idempotent on
//! `event_id`, which is what lets the dispatcher redeliver safely.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

use marlow_domain::EventEnvelope;

/// Capacity of the in-memory sink's fan-out channel.
const FANOUT_CAPACITY: usize = 1024;

/// Publisher failures.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Broker unavailable or rejected the publish; retryable
    #[error("Publish failed: {0}")]
    Transport(String),
}

/// Port for publishing event envelopes to `trade.events`.
#[async_trait]
pub trait TradeEventSink: Send + Sync {
    /// Publish one envelope. Re-publishing an already-seen `event_id` must
    /// succeed without producing a duplicate.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError>;
}

// =============================================================================
// In-memory sink
// =============================================================================

/// In-memory `trade.events`: retains every accepted envelope in publish
/// order, deduplicates on event id, and fans out to subscribers.
pub struct MemoryTradeEvents {
    published: RwLock<Vec<EventEnvelope>>,
    seen: RwLock<HashSet<String>>,
    fanout: broadcast::Sender<EventEnvelope>,
    fail_queue: RwLock<Vec<String>>,
}

impl MemoryTradeEvents {
    /// Empty sink.
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            published: RwLock::new(Vec::new()),
            seen: RwLock::new(HashSet::new()),
            fanout,
            fail_queue: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to envelopes accepted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.fanout.subscribe()
    }

    /// All accepted envelopes, in publish order.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.published.read().unwrap().clone()
    }

    /// Accepted envelopes of one event type, in publish order.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.event.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Number of accepted envelopes.
    pub fn event_count(&self) -> usize {
        self.published.read().unwrap().len()
    }

    /// Script the next publish to fail transiently with `reason`.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.fail_queue.write().unwrap().push(reason.into());
    }
}

impl Default for MemoryTradeEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeEventSink for MemoryTradeEvents {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let scripted = {
            let mut queue = self.fail_queue.write().unwrap();
            if queue.is_empty() { None } else { Some(queue.remove(0)) }
        };
        if let Some(reason) = scripted {
            return Err(PublishError::Transport(reason));
        }

        if !self.seen.write().unwrap().insert(envelope.event_id.clone()) {
            // Duplicate emission; ack without effect
            return Ok(());
        }
        self.published.write().unwrap().push(envelope.clone());
        let _ = self.fanout.send(envelope.clone());
        Ok(())
    }
}
