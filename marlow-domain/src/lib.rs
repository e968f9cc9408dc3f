//! Marlow Domain Layer
//!
//! Pure domain logic with zero I/O dependencies: entities, value objects,
//! deterministic id derivation, the business-day calendar, and the canonical
//! event vocabulary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calendar;
pub mod entities;
pub mod events;
pub mod ids;
pub mod value_objects;

pub use calendar::BusinessCalendar;
pub use entities::{
    AccountId, AllocId, Allocation, BlockId, BlockTrade, ExecId, Execution, Instrument,
    InstrumentId, Order, OrderId, SettleId, SettlementInstruction,
};
pub use events::{EventEnvelope, TradeEvent, EVENT_SCHEMA_VERSION};
pub use value_objects::{
    round_money, BlockStatus, CurrencyScales, DomainError, Price, Quantity, SecurityType,
    SettleMethod, Side, TradeDate,
};
