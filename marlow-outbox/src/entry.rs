//! Outbox entries.
//!
//! Rules never touch the broker or the gateway directly. They stage intents;
//! the commit appends them here, and the dispatcher drains them afterwards.
//! An entry stays `Pending` until its sink acks, so a crash between commit
//! and drain redelivers (at-least-once outbound, at-most-once store
//! mutation).

use marlow_domain::{EventEnvelope, SettlementInstruction};

/// An outbound effect staged by a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboxIntent {
    /// Publish an event envelope to `trade.events`
    PublishEvent(EventEnvelope),
    /// POST a settlement instruction to the gateway
    SendSettlement(SettlementInstruction),
}

impl OutboxIntent {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            OutboxIntent::PublishEvent(envelope) => {
                format!("publish {}", envelope.event.qualified_type())
            },
            OutboxIntent::SendSettlement(instruction) => {
                format!("settle {}", instruction.settle_id)
            },
        }
    }
}

/// Dispatch state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Awaiting dispatch (or redrive)
    Pending,
    /// Sink acked
    Done,
    /// Terminally rejected; operator workflow takes over
    DeadLettered,
}

/// One appended outbound effect.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Append sequence, unique and monotonic per worker
    pub seq: u64,
    /// The staged effect
    pub intent: OutboxIntent,
    /// Dispatch state
    pub status: EntryStatus,
    /// Dispatch attempts so far
    pub attempts: u32,
}
