//! IngestExecution rule.
//!
//! Fires on every message from `fix.executions`. Validates the fill,
//! upserts it by `exec_id` and announces `ExecutionReceived`. Idempotent on
//! `exec_id`: a redelivered fill replaces the row with identical contents
//! and its event deduplicates at the sink.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marlow_domain::{Execution, Price, Quantity, TradeDate, TradeEvent};

use crate::context::RuleTx;
use crate::error::RuleError;

/// Inbound wire message from the execution feed.
///
/// Quantities and prices arrive as raw decimals; the ingest preconditions
/// (`qty > 0`, `price > 0`, valid `YYYYMMDD` date) are what let the typed
/// `Execution` row be constructed at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMsg {
    /// Execution id, also the feed dedupe key
    pub exec_id: String,
    /// Parent order id
    pub order_id: String,
    /// Instrument id, also the feed partition key
    pub instrument_id: String,
    /// Fill quantity
    pub qty: Decimal,
    /// Fill price
    pub price: Decimal,
    /// Trade date as `YYYYMMDD`
    pub trade_date: String,
    /// Venue the fill printed on
    pub venue: String,
}

/// Apply the ingest rule to one message.
pub fn apply(rtx: &mut RuleTx<'_>, msg: &ExecutionMsg) -> Result<Execution, RuleError> {
    if msg.qty <= Decimal::ZERO {
        return Err(RuleError::Validation(format!(
            "exec {}: qty {} must be > 0",
            msg.exec_id, msg.qty
        )));
    }
    if msg.price <= Decimal::ZERO {
        return Err(RuleError::Validation(format!(
            "exec {}: price {} must be > 0",
            msg.exec_id, msg.price
        )));
    }
    let trade_date = TradeDate::parse(&msg.trade_date)
        .map_err(|e| RuleError::Validation(format!("exec {}: {}", msg.exec_id, e)))?;

    let execution = Execution {
        exec_id: msg.exec_id.clone(),
        order_id: msg.order_id.clone(),
        instrument_id: msg.instrument_id.clone(),
        qty: Quantity::new(msg.qty).map_err(|e| RuleError::Validation(e.to_string()))?,
        price: Price::new(msg.price).map_err(|e| RuleError::Validation(e.to_string()))?,
        trade_date,
        venue: msg.venue.clone(),
    };

    rtx.upsert_execution(execution.clone());
    rtx.publish(TradeEvent::ExecutionReceived {
        exec_id: execution.exec_id.clone(),
        order_id: execution.order_id.clone(),
        qty: execution.qty,
        price: execution.price,
        venue: execution.venue.clone(),
    });
    Ok(execution)
}

// =============================================================================
// Tests
// =============================================================================
