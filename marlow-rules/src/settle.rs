//! GenerateSettlement rule.
//!
//! Fires on the store's allocation-created notification. Resolves the
//! instrument through the allocation's block (the only join that is actually
//! well-keyed), prices the cash leg at the allocation quantity times the
//! locked allocation price, and stages a DVP instruction for dispatch. The
//! deterministic settlement id doubles as the gateway idempotency key, so a
//! redriven instruction cannot settle twice.

use marlow_domain::{
    ids, round_money, BusinessCalendar, CurrencyScales, SettleMethod, SettlementInstruction,
};
use marlow_store::StoreError;

use crate::context::RuleTx;
use crate::error::RuleError;

/// Standard settlement cycle: trade date plus two business days.
pub const SETTLEMENT_LAG_DAYS: u32 = 2;

/// Apply the settlement rule to one allocation.
pub fn apply(
    rtx: &mut RuleTx<'_>,
    alloc_id: &str,
    calendar: &BusinessCalendar,
    scales: &CurrencyScales,
) -> Result<SettlementInstruction, RuleError> {
    let missing = |what: String| move |e: StoreError| match e {
        StoreError::NotFound { .. } => RuleError::MissingReference(what.clone()),
        other => RuleError::Store(other),
    };

    let allocation = rtx
        .allocation(alloc_id)
        .map_err(missing(format!("allocation {}", alloc_id)))?;
    let block = rtx
        .block(&allocation.block_id)
        .map_err(missing(format!("block {} for allocation {}", allocation.block_id, alloc_id)))?;
    let instrument = rtx
        .instrument(&block.instrument_id)
        .map_err(missing(format!("instrument {}", block.instrument_id)))?;
    let scale = scales
        .scale_of(&instrument.currency)
        .map_err(|e| RuleError::MissingReference(e.to_string()))?;

    let settle_date = calendar.add_business_days(block.trade_date, SETTLEMENT_LAG_DAYS);
    let cash_amount = round_money(
        allocation.alloc_qty.as_decimal() * allocation.alloc_price.as_decimal(),
        scale,
    );

    let instruction = SettlementInstruction {
        settle_id: ids::settle_id(alloc_id),
        alloc_id: allocation.alloc_id,
        account_id: allocation.account_id,
        isin: instrument.isin,
        settle_date,
        method: SettleMethod::Dvp,
        cash_amount,
    };
    rtx.send_settlement(instruction.clone());
    Ok(instruction)
}

// =============================================================================
// Tests
// =============================================================================
