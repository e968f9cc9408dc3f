//! AllocateBlock rule.
//!
//! Fires on `BlockReady`. Splits the block's gross quantity equally across
//! the participating accounts, assigns the rounding residual in
//! lexicographic account order, and marks the block allocated. Deterministic
//! allocation ids make a replayed pass an idempotent upsert.
//!
//! Participant selection is every order for the block's instrument, with no
//! side or open-quantity filter; that mirrors the upstream product decision
//! this system implements (see DESIGN.md).

use rust_decimal::Decimal;

use marlow_domain::{ids, AccountId, Allocation, BlockStatus, Quantity, TradeEvent};
use marlow_store::StoreError;

use crate::context::RuleTx;
use crate::error::RuleError;

/// Allocation lot: account slices are carved in whole units of quantity.
const ALLOCATION_LOT: Decimal = Decimal::ONE;

/// What the allocation pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocateOutcome {
    /// Allocations upserted and the block marked allocated
    Allocated {
        /// Accounts that received a slice
        accounts: usize,
    },
    /// Block was not ready (busted, already allocated); no-op
    Skipped {
        /// Status observed
        status: BlockStatus,
    },
    /// No orders for the instrument; block left ready
    NoParticipants,
}

/// Apply the allocation rule to one block.
pub fn apply(rtx: &mut RuleTx<'_>, block_id: &str) -> Result<AllocateOutcome, RuleError> {
    let mut block = rtx.block(block_id).map_err(|e| match e {
        StoreError::NotFound { .. } => {
            RuleError::MissingReference(format!("block {}", block_id))
        },
        other => RuleError::Store(other),
    })?;

    if block.status != BlockStatus::ReadyToAllocate {
        return Ok(AllocateOutcome::Skipped { status: block.status });
    }

    let mut accounts: Vec<AccountId> = rtx
        .orders_all(|o| o.instrument_id == block.instrument_id)
        .into_iter()
        .map(|o| o.account_id)
        .collect();
    accounts.sort();
    accounts.dedup();

    if accounts.is_empty() {
        return Ok(AllocateOutcome::NoParticipants);
    }

    let shares = split_equal(block.gross_qty.as_decimal(), accounts.len());
    let mut allocated = 0usize;
    for (account_id, share) in accounts.into_iter().zip(shares) {
        if share <= Decimal::ZERO {
            continue;
        }
        let allocation = Allocation {
            alloc_id: ids::alloc_id(&block.block_id, &account_id),
            block_id: block.block_id.clone(),
            account_id: account_id.clone(),
            alloc_qty: Quantity::new(share).map_err(|e| RuleError::Validation(e.to_string()))?,
            alloc_price: block.avg_price,
        };
        rtx.publish(TradeEvent::AllocationCreated {
            alloc_id: allocation.alloc_id.clone(),
            block_id: allocation.block_id.clone(),
            account_id,
            alloc_qty: allocation.alloc_qty,
        });
        rtx.upsert_allocation(allocation);
        allocated += 1;
    }

    block.status = BlockStatus::Allocated;
    rtx.upsert_block(block);
    Ok(AllocateOutcome::Allocated { accounts: allocated })
}

/// Equal split of `gross` over `n` participants at the allocation lot scale.
///
/// Each participant gets `floor(gross / n)`; the residual is handed out one
/// lot at a time, in participant order, until exhausted. The final hand-out
/// may be a fractional lot when `gross` itself is fractional, so the shares
/// always sum to `gross` exactly. A `gross` smaller than `n` leaves trailing
/// participants with zero, which callers must not materialize.
fn split_equal(gross: Decimal, n: usize) -> Vec<Decimal> {
    let count = Decimal::from(n as u64);
    let base = (gross / count).floor();
    let mut residual = gross - base * count;

    (0..n)
        .map(|_| {
            let extra = residual.min(ALLOCATION_LOT);
            residual -= extra;
            base + extra
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use marlow_domain::{BlockTrade, Order, Price, Side, TradeDate};
    use marlow_outbox::Outbox;
    use marlow_store::MemoryStore;
    use rust_decimal_macros::dec;

    fn jan15() -> TradeDate {
        TradeDate::parse("20240115").unwrap()
    }

    fn ready_block(gross: Decimal) -> BlockTrade {
        BlockTrade {
            block_id: "BLK-test".to_string(),
            instrument_id: "AAPL.O".to_string(),
            side: Side::Buy,
            trade_date: jan15(),
            gross_qty: Quantity::new(gross).unwrap(),
            avg_price: Price::new(dec!(10.40)).unwrap(),
            status: BlockStatus::ReadyToAllocate,
        }
    }

    fn order_for(order_id: &str, account: &str) -> Order {
        Order {
            order_id: order_id.to_string(),
            account_id: account.to_string(),
            instrument_id: "AAPL.O".to_string(),
            side: Side::Buy,
            qty: Quantity::new(dec!(100)).unwrap(),
            trader: "tr-1".to_string(),
        }
    }

    fn seed(store: &MemoryStore, block: BlockTrade, accounts: &[&str]) {
        let mut tx = store.begin();
        tx.upsert_block(block);
        for (i, account) in accounts.iter().enumerate() {
            tx.upsert_order(order_for(&format!("O{}", i + 1), account));
        }
        tx.commit().unwrap();
    }

    #[test]
    fn test_split_equal_residual_to_front() {
        assert_eq!(split_equal(dec!(100), 3), vec![dec!(34), dec!(33), dec!(33)]);
        assert_eq!(split_equal(dec!(100), 4), vec![dec!(25), dec!(25), dec!(25), dec!(25)]);
        assert_eq!(split_equal(dec!(101), 4), vec![dec!(26), dec!(25), dec!(25), dec!(25)]);
        assert_eq!(split_equal(dec!(103), 4), vec![dec!(26), dec!(26), dec!(26), dec!(25)]);
    }

    #[test]
    fn test_split_equal_gross_below_participant_count() {
        assert_eq!(split_equal(dec!(2), 3), vec![dec!(1), dec!(1), dec!(0)]);
    }

    #[test]
    fn test_split_equal_fractional_gross_sums_exactly() {
        let shares = split_equal(dec!(100.5), 3);
        assert_eq!(shares, vec![dec!(34), dec!(33.5), dec!(33)]);
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec!(100.5));
    }

    #[test]
    fn test_allocate_three_accounts_with_residual() {
        let store = MemoryStore::new();
        let outbox = Outbox::new();
        seed(&store, ready_block(dec!(100)), &["A1", "A2", "A3"]);

        let mut rtx = RuleTx::new(store.begin());
        let outcome = apply(&mut rtx, "BLK-test").unwrap();
        rtx.commit(&outbox).unwrap();

        assert_eq!(outcome, AllocateOutcome::Allocated { accounts: 3 });
        let mut allocations = store.allocations_for_block("BLK-test");
        allocations.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        let qtys: Vec<Decimal> = allocations.iter().map(|a| a.alloc_qty.as_decimal()).collect();
        assert_eq!(qtys, vec![dec!(34), dec!(33), dec!(33)]);
        // Every slice priced at the block average
        assert!(allocations.iter().all(|a| a.alloc_price.as_decimal() == dec!(10.40)));
        assert_eq!(store.block("BLK-test").unwrap().status, BlockStatus::Allocated);
    }

    #[test]
    fn test_allocate_skips_non_ready_block() {
        let store = MemoryStore::new();
        let outbox = Outbox::new();
        let mut busted = ready_block(dec!(100));
        busted.status = BlockStatus::Busted;
        seed(&store, busted, &["A1"]);

        let mut rtx = RuleTx::new(store.begin());
        let outcome = apply(&mut rtx, "BLK-test").unwrap();
        rtx.commit(&outbox).unwrap();

        assert_eq!(outcome, AllocateOutcome::Skipped { status: BlockStatus::Busted });
        assert_eq!(store.allocation_count(), 0);
        assert_eq!(outbox.pending_count(), 0);
    }

    #[test]
    fn test_allocate_small_gross_skips_trailing_accounts() {
        let store = MemoryStore::new();
        let outbox = Outbox::new();
        seed(&store, ready_block(dec!(2)), &["A1", "A2", "A3"]);

        let mut rtx = RuleTx::new(store.begin());
        let outcome = apply(&mut rtx, "BLK-test").unwrap();
        rtx.commit(&outbox).unwrap();

        assert_eq!(outcome, AllocateOutcome::Allocated { accounts: 2 });
        let allocations = store.allocations_for_block("BLK-test");
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.alloc_qty.is_positive()));
    }

    #[test]
    fn test_allocate_dedupes_accounts_across_orders() {
        let store = MemoryStore::new();
        let outbox = Outbox::new();
        // A1 carries two orders; it is still one participant
        seed(&store, ready_block(dec!(100)), &["A1", "A1", "A2"]);

        let mut rtx = RuleTx::new(store.begin());
        let outcome = apply(&mut rtx, "BLK-test").unwrap();
        rtx.commit(&outbox).unwrap();

        assert_eq!(outcome, AllocateOutcome::Allocated { accounts: 2 });
        let allocations = store.allocations_for_block("BLK-test");
        assert_eq!(allocations.len(), 2);
        assert_eq!(
            allocations.iter().map(|a| a.alloc_qty.as_decimal()).sum::<Decimal>(),
            dec!(100)
        );
    }

    #[test]
    fn test_allocate_replay_is_idempotent() {
        let store = MemoryStore::new();
        let outbox = Outbox::new();
        seed(&store, ready_block(dec!(100)), &["A1", "A2", "A3"]);

        let mut rtx = RuleTx::new(store.begin());
        apply(&mut rtx, "BLK-test").unwrap();
        rtx.commit(&outbox).unwrap();

        // Redelivered BlockReady: the block is no longer ready, so the pass
        // is a no-op and the table is unchanged
        let mut rtx = RuleTx::new(store.begin());
        let outcome = apply(&mut rtx, "BLK-test").unwrap();
        rtx.commit(&outbox).unwrap();

        assert_eq!(outcome, AllocateOutcome::Skipped { status: BlockStatus::Allocated });
        assert_eq!(store.allocation_count(), 3);
    }

    #[test]
    fn test_allocate_missing_block_is_missing_reference() {
        let store = MemoryStore::new();
        let mut rtx = RuleTx::new(store.begin());
        let err = apply(&mut rtx, "BLK-none").unwrap_err();
        assert!(matches!(err, RuleError::MissingReference(_)));
    }
}
