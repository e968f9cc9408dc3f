//! Canonical Business Events
//!
//! Everything the pipeline does is announced on the `trade.events` topic as
//! an enveloped event. Consumers key on `event_type` plus `schema_version`;
//! the payload shapes are frozen per version.
//!
//! Event ids are content hashes: a replayed rule emitting a byte-identical
//! payload produces the same `event_id`, and the publisher deduplicates on
//! it. A re-aggregation that changes the payload is a new event.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::{AccountId, AllocId, BlockId, ExecId, OrderId, SettleId};
use crate::value_objects::{Price, Quantity};

/// Payload schema version for every event this build emits.
pub const EVENT_SCHEMA_VERSION: u16 = 1;

// =============================================================================
// Event Types
// =============================================================================

/// Business events published to `trade.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum TradeEvent {
    /// A fill passed ingest validation and was recorded
    ExecutionReceived {
        /// Execution identifier
        exec_id: ExecId,
        /// Parent order
        order_id: OrderId,
        /// Filled quantity
        qty: Quantity,
        /// Fill price
        price: Price,
        /// Venue the fill printed on
        venue: String,
    },

    /// A block finished an aggregation pass and is eligible for allocation
    BlockReady {
        /// Block identifier
        block_id: BlockId,
        /// Recomputed gross quantity
        gross_qty: Quantity,
        /// Recomputed average price
        avg_price: Price,
    },

    /// An allocation slice was created for an account
    AllocationCreated {
        /// Allocation identifier
        alloc_id: AllocId,
        /// Parent block
        block_id: BlockId,
        /// Receiving account
        account_id: AccountId,
        /// Allocated quantity
        alloc_qty: Quantity,
    },

    /// The gateway acknowledged a settlement instruction
    SettlementSent {
        /// Settlement identifier
        settle_id: SettleId,
        /// Allocation settled
        alloc_id: AllocId,
    },
}

impl TradeEvent {
    /// Bare event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            TradeEvent::ExecutionReceived { .. } => "ExecutionReceived",
            TradeEvent::BlockReady { .. } => "BlockReady",
            TradeEvent::AllocationCreated { .. } => "AllocationCreated",
            TradeEvent::SettlementSent { .. } => "SettlementSent",
        }
    }

    /// Version-qualified type name, e.g. `BlockReady.v1`
    pub fn qualified_type(&self) -> String {
        format!("{}.v{}", self.event_type(), EVENT_SCHEMA_VERSION)
    }

    /// Wrap into a publishable envelope with a content-hash event id.
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.content_id(),
            schema_version: EVENT_SCHEMA_VERSION,
            event: self.clone(),
        }
    }

    /// Deterministic event id: SHA256 over the qualified type and the
    /// canonical payload serialization.
    fn content_id(&self) -> String {
        // Struct-variant field order is fixed at compile time, so the JSON
        // serialization is canonical without key sorting.
        let tagged = serde_json::to_value(self).unwrap_or_default();
        let payload = tagged.get("payload").cloned().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.qualified_type().as_bytes());
        hasher.update(b"|");
        hasher.update(payload.to_string().as_bytes());
        format!("evt_{}", hex::encode(hasher.finalize()))
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Wire envelope for `trade.events`: `{event_id, schema_version, event_type,
/// payload}`, with the tagged event flattened into the last two fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Content-hash id, the publisher's dedupe key
    pub event_id: String,
    /// Payload schema version
    pub schema_version: u16,
    /// The tagged event (`event_type` + `payload` on the wire)
    #[serde(flatten)]
    pub event: TradeEvent,
}

// =============================================================================
// Tests
// =============================================================================
