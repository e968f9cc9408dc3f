//! Domain Entities for the Marlow Post-Trade Engine
//!
//! The five projected tables (instruments, orders, executions, blocks,
//! allocations) plus the settlement instruction, which is materialized and
//! sent but never persisted.
//!
//! Identifiers are opaque strings, unique within a process run. Block,
//! allocation and settlement ids are deterministic (see `ids`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{
    BlockStatus, Price, Quantity, SecurityType, SettleMethod, Side, TradeDate,
};

// =============================================================================
// Identifier aliases
// =============================================================================

/// Opaque instrument identifier
pub type InstrumentId = String;
/// Opaque order identifier
pub type OrderId = String;
/// Opaque execution identifier (the inbound dedupe key)
pub type ExecId = String;
/// Deterministic block identifier
pub type BlockId = String;
/// Deterministic allocation identifier
pub type AllocId = String;
/// Deterministic settlement identifier
pub type SettleId = String;
/// Opaque account identifier
pub type AccountId = String;

// =============================================================================
// Instrument
// =============================================================================

/// Static instrument reference data. Created externally; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Primary key
    pub instrument_id: InstrumentId,
    /// Asset class
    pub security_type: SecurityType,
    /// International security identifier
    pub isin: String,
    /// Settlement currency (drives the money rounding scale)
    pub currency: String,
    /// Market identifier code of the primary venue
    pub venue: String,
}

// =============================================================================
// Order
// =============================================================================

/// Client order intent. Created externally; the pipeline only reads it to
/// resolve fills and select allocation participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Primary key
    pub order_id: OrderId,
    /// Account the order trades for
    pub account_id: AccountId,
    /// Instrument being traded
    pub instrument_id: InstrumentId,
    /// Buy or sell
    pub side: Side,
    /// Ordered quantity
    pub qty: Quantity,
    /// Trader who owns the order
    pub trader: String,
}

// =============================================================================
// Execution
// =============================================================================

/// A realized fill from the execution feed.
///
/// Inserted by the ingest rule; mutated only by bust corrections, which set
/// `qty` to zero in place so re-aggregation excludes the fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Primary key and inbound dedupe key
    pub exec_id: ExecId,
    /// Parent order
    pub order_id: OrderId,
    /// Instrument filled
    pub instrument_id: InstrumentId,
    /// Filled quantity
    pub qty: Quantity,
    /// Fill price
    pub price: Price,
    /// Trade date
    pub trade_date: TradeDate,
    /// Venue the fill printed on
    pub venue: String,
}

impl Execution {
    /// True once a bust correction has zeroed this fill.
    pub fn is_busted(&self) -> bool {
        !self.qty.is_positive()
    }
}

// =============================================================================
// BlockTrade
// =============================================================================

/// Aggregated parent trade over the fills of one
/// (instrument, side, trade date) group.
///
/// The block is a pure function of the current execution set: every fill
/// triggers a full recompute of `gross_qty` and `avg_price` rather than an
/// incremental add, so replays and bust corrections converge to the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTrade {
    /// Primary key, stable across fills of the group
    pub block_id: BlockId,
    /// Instrument of the group
    pub instrument_id: InstrumentId,
    /// Side of the group (from the parent orders)
    pub side: Side,
    /// Trade date of the group
    pub trade_date: TradeDate,
    /// Sum of strictly-positive fill quantities
    pub gross_qty: Quantity,
    /// Quantity-weighted average price, rounded to the currency scale
    pub avg_price: Price,
    /// Lifecycle status
    pub status: BlockStatus,
}

// =============================================================================
// Allocation
// =============================================================================

/// Per-account slice of an allocated block.
///
/// Immutable once created: busts propagate through the block status, not by
/// mutating allocations. Replayed allocation passes upsert the same
/// deterministic `alloc_id` with identical contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Primary key, deterministic over (block, account)
    pub alloc_id: AllocId,
    /// Parent block
    pub block_id: BlockId,
    /// Receiving account
    pub account_id: AccountId,
    /// Allocated quantity
    pub alloc_qty: Quantity,
    /// Block average price at the moment of allocation
    pub alloc_price: Price,
}

// =============================================================================
// SettlementInstruction
// =============================================================================

/// Outbound settlement payload. Materialized per allocation and POSTed to
/// the gateway; the core keeps no settlement table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementInstruction {
    /// Deterministic id, also the gateway idempotency key
    pub settle_id: SettleId,
    /// Allocation being settled
    pub alloc_id: AllocId,
    /// Receiving account
    pub account_id: AccountId,
    /// Security identifier for the depot leg
    pub isin: String,
    /// Settlement date (T+2 business days)
    pub settle_date: TradeDate,
    /// Settlement method
    pub method: SettleMethod,
    /// Cash leg, rounded to the instrument currency scale
    pub cash_amount: Decimal,
}

// =============================================================================
// Tests
// =============================================================================
