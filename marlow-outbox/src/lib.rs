//! Marlow Outbox Layer
//!
//! Bridges transactional store mutations to the non-transactional broker and
//! gateway: rules stage intents, commit appends them, the dispatcher drains
//! them after commit, and both sinks are idempotent so redelivery is safe.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod entry;
pub mod outbox;
pub mod sink;

pub use dispatcher::{DeadLetteredEffect, DrainReport, OutboxDispatcher};
pub use entry::{EntryStatus, OutboxEntry, OutboxIntent};
pub use outbox::Outbox;
pub use sink::{MemoryTradeEvents, PublishError, TradeEventSink};
