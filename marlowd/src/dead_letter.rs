//! Dead-letter queue.
//!
//! Messages and outbound effects that must not advance the pipeline land
//! here for operator intervention: failed ingest preconditions, missing
//! references, terminal gateway rejections.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// A parked message or effect.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Triage handle
    pub id: Uuid,
    /// Which stage parked it
    pub stage: String,
    /// Why
    pub reason: String,
    /// The offending payload, serialized for triage
    pub payload: serde_json::Value,
    /// When it was parked
    pub at: DateTime<Utc>,
}

/// In-memory dead-letter queue.
pub struct DeadLetterQueue {
    entries: RwLock<Vec<DeadLetter>>,
}

impl DeadLetterQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    /// Park an entry. Logged at warn so alerting picks it up.
    pub fn push(&self, stage: &str, reason: impl Into<String>, payload: serde_json::Value) {
        let id = Uuid::now_v7();
        let reason = reason.into();
        warn!(%id, stage, %reason, "Dead-lettered");
        self.entries.write().unwrap().push(DeadLetter {
            id,
            stage: stage.to_string(),
            reason,
            payload,
            at: Utc::now(),
        });
    }

    /// Entries parked so far, oldest first.
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries.read().unwrap().clone()
    }

    /// Number of parked entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// True when nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new()
    }
}
