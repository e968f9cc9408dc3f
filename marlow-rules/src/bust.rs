//! HandleBust rule.
//!
//! Fires on the store's execution-updated notification. A correction that
//! zeroes a fill busts every block of the fill's (instrument, trade date)
//! scope: the blocks stop accepting allocation but already-dispatched
//! settlement instructions stand, retraction being an operator workflow.

use marlow_domain::{BlockId, BlockStatus};
use marlow_store::StoreError;

use crate::context::RuleTx;
use crate::error::RuleError;

/// Apply the bust rule for an updated execution.
///
/// Returns the block ids transitioned to `BUSTED`; empty when the update
/// was not a bust (quantity still positive) or the blocks were already
/// busted.
pub fn apply(rtx: &mut RuleTx<'_>, exec_id: &str) -> Result<Vec<BlockId>, RuleError> {
    let execution = rtx.execution(exec_id).map_err(|e| match e {
        StoreError::NotFound { .. } => {
            RuleError::MissingReference(format!("execution {}", exec_id))
        },
        other => RuleError::Store(other),
    })?;

    if execution.qty.is_positive() {
        return Ok(Vec::new());
    }

    let affected = rtx.blocks_all(|b| {
        b.instrument_id == execution.instrument_id && b.trade_date == execution.trade_date
    });

    let mut busted = Vec::new();
    for mut block in affected {
        if block.status == BlockStatus::Busted {
            continue;
        }
        block.status = BlockStatus::Busted;
        busted.push(block.block_id.clone());
        rtx.upsert_block(block);
    }
    Ok(busted)
}

// =============================================================================
// Tests
// =============================================================================
