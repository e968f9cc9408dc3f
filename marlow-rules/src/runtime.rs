//! Rule runtime.
//!
//! Owns the store, the outbox and the reference configuration (calendar,
//! currency scales) and exposes one entry point per trigger. Each entry
//! point runs its rule chain inside a single transaction: the caller gets
//! the committed change set back and the staged outbound intents are
//! already in the outbox by the time the call returns. Nothing here
//! performs network I/O; rule bodies stay synchronous between their reads
//! and their writes.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use marlow_domain::{BlockId, BusinessCalendar, CurrencyScales, Quantity, SettlementInstruction};
use marlow_outbox::Outbox;
use marlow_store::{MemoryStore, StoreChange, StoreError};

use crate::allocate::{self, AllocateOutcome};
use crate::build_block;
use crate::bust;
use crate::context::RuleTx;
use crate::error::RuleError;
use crate::ingest::{self, ExecutionMsg};
use crate::settle;

/// Result of the ingest + aggregation chain for one feed message.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Block the fill aggregated into
    pub block_id: BlockId,
    /// Committed store changes, in staging order
    pub changes: Vec<StoreChange>,
}

/// Result of an allocation pass.
#[derive(Debug, Clone)]
pub struct AllocateReport {
    /// What the pass did
    pub outcome: AllocateOutcome,
    /// Committed store changes, in staging order
    pub changes: Vec<StoreChange>,
}

/// The rule runtime.
pub struct RuleRuntime {
    store: Arc<MemoryStore>,
    outbox: Arc<Outbox>,
    calendar: BusinessCalendar,
    scales: CurrencyScales,
}

impl RuleRuntime {
    /// Assemble a runtime over shared store and outbox.
    pub fn new(
        store: Arc<MemoryStore>,
        outbox: Arc<Outbox>,
        calendar: BusinessCalendar,
        scales: CurrencyScales,
    ) -> Self {
        Self { store, outbox, calendar, scales }
    }

    /// Shared store handle.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Shared outbox handle.
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Ingest + BuildBlock, chained in one transaction.
    pub fn process_execution(&self, msg: &ExecutionMsg) -> Result<ExecutionReport, RuleError> {
        let mut rtx = RuleTx::new(self.store.begin());
        let execution = ingest::apply(&mut rtx, msg)?;
        let block = build_block::apply(&mut rtx, &execution, &self.scales)?;
        let changes = rtx.commit(&self.outbox)?;

        info!(
            exec_id = %execution.exec_id,
            block_id = %block.block_id,
            gross_qty = %block.gross_qty,
            avg_price = %block.avg_price,
            "Fill ingested, block re-aggregated"
        );
        Ok(ExecutionReport { block_id: block.block_id, changes })
    }

    /// AllocateBlock, fired by `BlockReady`.
    pub fn allocate_block(&self, block_id: &str) -> Result<AllocateReport, RuleError> {
        let mut rtx = RuleTx::new(self.store.begin());
        let outcome = allocate::apply(&mut rtx, block_id)?;
        let changes = rtx.commit(&self.outbox)?;

        match &outcome {
            AllocateOutcome::Allocated { accounts } => {
                info!(block_id, accounts, "Block allocated");
            },
            AllocateOutcome::Skipped { status } => {
                debug!(block_id, %status, "Allocation skipped, block not ready");
            },
            AllocateOutcome::NoParticipants => {
                info!(block_id, "No participating orders, block left ready");
            },
        }
        Ok(AllocateReport { outcome, changes })
    }

    /// GenerateSettlement, fired by the allocation-created notification.
    pub fn generate_settlement(&self, alloc_id: &str) -> Result<SettlementInstruction, RuleError> {
        let mut rtx = RuleTx::new(self.store.begin());
        let instruction = settle::apply(&mut rtx, alloc_id, &self.calendar, &self.scales)?;
        rtx.commit(&self.outbox)?;

        info!(
            alloc_id,
            settle_id = %instruction.settle_id,
            settle_date = %instruction.settle_date,
            cash_amount = %instruction.cash_amount,
            "Settlement instruction staged"
        );
        Ok(instruction)
    }

    /// HandleBust, fired by the execution-updated notification.
    pub fn handle_bust(&self, exec_id: &str) -> Result<Vec<BlockId>, RuleError> {
        let mut rtx = RuleTx::new(self.store.begin());
        let busted = bust::apply(&mut rtx, exec_id)?;
        rtx.commit(&self.outbox)?;

        if !busted.is_empty() {
            info!(exec_id, blocks = busted.len(), "Blocks busted");
        }
        Ok(busted)
    }

    /// Record an out-of-band execution correction (the bust channel).
    ///
    /// Negative corrections clamp to zero; the store's execution-updated
    /// notification then drives `handle_bust`.
    pub fn record_correction(
        &self,
        exec_id: &str,
        new_qty: Decimal,
    ) -> Result<Vec<StoreChange>, RuleError> {
        let mut rtx = RuleTx::new(self.store.begin());
        let mut execution = rtx.execution(exec_id).map_err(|e| match e {
            StoreError::NotFound { .. } => {
                RuleError::MissingReference(format!("execution {}", exec_id))
            },
            other => RuleError::Store(other),
        })?;
        execution.qty = Quantity::new(new_qty.max(Decimal::ZERO))
            .map_err(|e| RuleError::Validation(e.to_string()))?;
        rtx.upsert_execution(execution);
        let changes = rtx.commit(&self.outbox)?;

        info!(exec_id, %new_qty, "Execution correction recorded");
        Ok(changes)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use marlow_domain::{BlockStatus, Instrument, Order, SecurityType, Side};
    use marlow_store::TableName;
    use rust_decimal_macros::dec;

    fn runtime() -> RuleRuntime {
        let runtime = RuleRuntime::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Outbox::new()),
            BusinessCalendar::weekends_only(),
            CurrencyScales::default(),
        );
        let mut tx = runtime.store().begin();
        tx.upsert_instrument(Instrument {
            instrument_id: "AAPL.O".to_string(),
            security_type: SecurityType::Equity,
            isin: "US0378331005".to_string(),
            currency: "USD".to_string(),
            venue: "XNAS".to_string(),
        });
        tx.upsert_order(Order {
            order_id: "O1".to_string(),
            account_id: "A1".to_string(),
            instrument_id: "AAPL.O".to_string(),
            side: Side::Buy,
            qty: Quantity::new(dec!(100)).unwrap(),
            trader: "tr-1".to_string(),
        });
        tx.commit().unwrap();
        runtime
    }

    fn fill_msg(exec_id: &str, qty: Decimal, price: Decimal) -> ExecutionMsg {
        ExecutionMsg {
            exec_id: exec_id.to_string(),
            order_id: "O1".to_string(),
            instrument_id: "AAPL.O".to_string(),
            qty,
            price,
            trade_date: "20240115".to_string(),
            venue: "XNAS".to_string(),
        }
    }

    #[test]
    fn test_process_execution_commits_row_block_and_intents() {
        let runtime = runtime();
        let report = runtime.process_execution(&fill_msg("X1", dec!(100), dec!(10.00))).unwrap();

        assert_eq!(report.changes.len(), 2);
        assert_eq!(report.changes[0].table, TableName::Executions);
        assert_eq!(report.changes[1].table, TableName::Blocks);
        // ExecutionReceived + BlockReady staged
        assert_eq!(runtime.outbox().pending_count(), 2);
        assert_eq!(runtime.store().block(&report.block_id).unwrap().status, BlockStatus::ReadyToAllocate);
    }

    #[test]
    fn test_failed_chain_stages_nothing() {
        let runtime = runtime();
        let msg = ExecutionMsg { order_id: "O-missing".to_string(), ..fill_msg("X1", dec!(100), dec!(10.00)) };

        let err = runtime.process_execution(&msg).unwrap_err();
        assert!(matches!(err, RuleError::MissingReference(_)));
        // The whole transaction rolled back: no execution row, no intents
        assert_eq!(runtime.store().execution_count(), 0);
        assert_eq!(runtime.outbox().pending_count(), 0);
    }

    #[test]
    fn test_allocate_then_settle_chain() {
        let runtime = runtime();
        let report = runtime.process_execution(&fill_msg("X1", dec!(100), dec!(10.00))).unwrap();

        let alloc_report = runtime.allocate_block(&report.block_id).unwrap();
        assert!(matches!(alloc_report.outcome, AllocateOutcome::Allocated { accounts: 1 }));

        let created: Vec<_> = alloc_report
            .changes
            .iter()
            .filter(|c| c.table == TableName::Allocations)
            .collect();
        assert_eq!(created.len(), 1);

        let instruction = runtime.generate_settlement(&created[0].pk).unwrap();
        assert_eq!(instruction.cash_amount, dec!(1000.00));
        assert_eq!(instruction.settle_date.as_yyyymmdd(), "20240117");
    }

    #[test]
    fn test_correction_then_bust() {
        let runtime = runtime();
        let report = runtime.process_execution(&fill_msg("X1", dec!(100), dec!(10.00))).unwrap();

        let changes = runtime.record_correction("X1", dec!(0)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].table, TableName::Executions);

        let busted = runtime.handle_bust("X1").unwrap();
        assert_eq!(busted, vec![report.block_id.clone()]);
        assert_eq!(runtime.store().block(&report.block_id).unwrap().status, BlockStatus::Busted);
    }
}
