//! In-memory transactional store
//!
//! The projection lives in five hash tables guarded by one `RwLock`. A
//! transaction clones the tables at begin (repeatable read), applies its own
//! writes to the clone (read-your-writes), and stages a change record per
//! touched primary key. Commit validates row versions against the live
//! tables (first committer wins), applies the staged rows atomically, and
//! releases change notifications after the lock is dropped.
//!
//! Postgres or another engine could back the same surface; the adapter
//! boundary of this system puts persistence out of scope, so the in-memory
//! implementation is the one that ships.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use marlow_domain::{Allocation, BlockTrade, Execution, Instrument, Order};

use crate::error::StoreError;
use crate::tables::{ChangeKind, StoreChange, TableName};

/// Buffered change notifications before slow subscribers start lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Tables
// =============================================================================

#[derive(Debug, Clone, Default)]
struct Tables {
    instruments: HashMap<String, Instrument>,
    orders: HashMap<String, Order>,
    executions: HashMap<String, Execution>,
    blocks: HashMap<String, BlockTrade>,
    allocations: HashMap<String, Allocation>,
    /// Commit count per row, for optimistic write validation
    versions: HashMap<(TableName, String), u64>,
}

impl Tables {
    fn contains(&self, table: TableName, pk: &str) -> bool {
        match table {
            TableName::Instruments => self.instruments.contains_key(pk),
            TableName::Orders => self.orders.contains_key(pk),
            TableName::Executions => self.executions.contains_key(pk),
            TableName::Blocks => self.blocks.contains_key(pk),
            TableName::Allocations => self.allocations.contains_key(pk),
        }
    }

    fn version(&self, table: TableName, pk: &str) -> u64 {
        self.versions.get(&(table, pk.to_string())).copied().unwrap_or(0)
    }

    /// Copy one row from `from` into `self`.
    fn adopt_row(&mut self, from: &Tables, table: TableName, pk: &str) {
        match table {
            TableName::Instruments => {
                if let Some(row) = from.instruments.get(pk) {
                    self.instruments.insert(pk.to_string(), row.clone());
                }
            },
            TableName::Orders => {
                if let Some(row) = from.orders.get(pk) {
                    self.orders.insert(pk.to_string(), row.clone());
                }
            },
            TableName::Executions => {
                if let Some(row) = from.executions.get(pk) {
                    self.executions.insert(pk.to_string(), row.clone());
                }
            },
            TableName::Blocks => {
                if let Some(row) = from.blocks.get(pk) {
                    self.blocks.insert(pk.to_string(), row.clone());
                }
            },
            TableName::Allocations => {
                if let Some(row) = from.allocations.get(pk) {
                    self.allocations.insert(pk.to_string(), row.clone());
                }
            },
        }
    }
}

/// The unique row matching a conjunctive predicate.
fn single_row<'a, T>(
    table: TableName,
    rows: impl Iterator<Item = &'a T>,
    pred: impl Fn(&T) -> bool,
) -> Result<&'a T, StoreError> {
    let mut matches = rows.filter(|row| pred(row));
    match (matches.next(), matches.next()) {
        (Some(row), None) => Ok(row),
        (None, _) => Err(StoreError::NotFound { table, detail: "predicate".to_string() }),
        (Some(_), Some(_)) => {
            // 2 already seen; count the rest for the diagnostic
            Err(StoreError::NotUnique { table, matches: 2 + matches.count() })
        },
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Shared in-memory store.
pub struct MemoryStore {
    live: RwLock<Tables>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { live: RwLock::new(Tables::default()), changes }
    }

    /// Open a transaction over a consistent snapshot of all five tables.
    pub fn begin(&self) -> StoreTx<'_> {
        let base = self.live.read().unwrap().clone();
        StoreTx { store: self, base, staged: Vec::new() }
    }

    /// Subscribe to post-commit change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    // --- direct reads (no transaction), for assertions and queries ---

    /// Block by pk
    pub fn block(&self, block_id: &str) -> Option<BlockTrade> {
        self.live.read().unwrap().blocks.get(block_id).cloned()
    }

    /// Execution by pk
    pub fn execution(&self, exec_id: &str) -> Option<Execution> {
        self.live.read().unwrap().executions.get(exec_id).cloned()
    }

    /// Allocation by pk
    pub fn allocation(&self, alloc_id: &str) -> Option<Allocation> {
        self.live.read().unwrap().allocations.get(alloc_id).cloned()
    }

    /// All allocations of a block, unordered
    pub fn allocations_for_block(&self, block_id: &str) -> Vec<Allocation> {
        self.live
            .read()
            .unwrap()
            .allocations
            .values()
            .filter(|a| a.block_id == block_id)
            .cloned()
            .collect()
    }

    /// Number of execution rows
    pub fn execution_count(&self) -> usize {
        self.live.read().unwrap().executions.len()
    }

    /// Number of block rows
    pub fn block_count(&self) -> usize {
        self.live.read().unwrap().blocks.len()
    }

    /// Number of allocation rows
    pub fn allocation_count(&self) -> usize {
        self.live.read().unwrap().allocations.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// StoreTx
// =============================================================================

struct StagedWrite {
    table: TableName,
    pk: String,
    kind: ChangeKind,
    observed_version: u64,
}

/// A transaction: snapshot reads, staged writes, atomic commit.
pub struct StoreTx<'a> {
    store: &'a MemoryStore,
    base: Tables,
    staged: Vec<StagedWrite>,
}

impl StoreTx<'_> {
    // --- reads ---

    /// Instrument by pk
    pub fn instrument(&self, instrument_id: &str) -> Result<Instrument, StoreError> {
        self.base
            .instruments
            .get(instrument_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(TableName::Instruments, instrument_id))
    }

    /// Order by pk
    pub fn order(&self, order_id: &str) -> Result<Order, StoreError> {
        self.base
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(TableName::Orders, order_id))
    }

    /// The unique order matching `pred`
    pub fn orders_single(&self, pred: impl Fn(&Order) -> bool) -> Result<Order, StoreError> {
        single_row(TableName::Orders, self.base.orders.values(), pred).cloned()
    }

    /// All orders matching `pred`, unordered
    pub fn orders_all(&self, pred: impl Fn(&Order) -> bool) -> Vec<Order> {
        self.base.orders.values().filter(|o| pred(o)).cloned().collect()
    }

    /// Execution by pk
    pub fn execution(&self, exec_id: &str) -> Result<Execution, StoreError> {
        self.base
            .executions
            .get(exec_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(TableName::Executions, exec_id))
    }

    /// All executions matching `pred`, unordered
    pub fn executions_all(&self, pred: impl Fn(&Execution) -> bool) -> Vec<Execution> {
        self.base.executions.values().filter(|e| pred(e)).cloned().collect()
    }

    /// Σ qty over executions matching `pred`
    pub fn executions_sum_qty(&self, pred: impl Fn(&Execution) -> bool) -> Decimal {
        self.base
            .executions
            .values()
            .filter(|e| pred(e))
            .map(|e| e.qty.as_decimal())
            .sum()
    }

    /// Σ qty·price over executions matching `pred`
    pub fn executions_sum_notional(&self, pred: impl Fn(&Execution) -> bool) -> Decimal {
        self.base
            .executions
            .values()
            .filter(|e| pred(e))
            .map(|e| e.qty.as_decimal() * e.price.as_decimal())
            .sum()
    }

    /// Block by pk
    pub fn block(&self, block_id: &str) -> Result<BlockTrade, StoreError> {
        self.base
            .blocks
            .get(block_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(TableName::Blocks, block_id))
    }

    /// Block by pk, absent rows as `None`
    pub fn block_opt(&self, block_id: &str) -> Option<BlockTrade> {
        self.base.blocks.get(block_id).cloned()
    }

    /// The unique block matching `pred`
    pub fn blocks_single(&self, pred: impl Fn(&BlockTrade) -> bool) -> Result<BlockTrade, StoreError> {
        single_row(TableName::Blocks, self.base.blocks.values(), pred).cloned()
    }

    /// All blocks matching `pred`, unordered
    pub fn blocks_all(&self, pred: impl Fn(&BlockTrade) -> bool) -> Vec<BlockTrade> {
        self.base.blocks.values().filter(|b| pred(b)).cloned().collect()
    }

    /// Allocation by pk
    pub fn allocation(&self, alloc_id: &str) -> Result<Allocation, StoreError> {
        self.base
            .allocations
            .get(alloc_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(TableName::Allocations, alloc_id))
    }

    /// All allocations matching `pred`, unordered
    pub fn allocations_all(&self, pred: impl Fn(&Allocation) -> bool) -> Vec<Allocation> {
        self.base.allocations.values().filter(|a| pred(a)).cloned().collect()
    }

    /// Σ alloc_qty over allocations matching `pred`
    pub fn allocations_sum_qty(&self, pred: impl Fn(&Allocation) -> bool) -> Decimal {
        self.base
            .allocations
            .values()
            .filter(|a| pred(a))
            .map(|a| a.alloc_qty.as_decimal())
            .sum()
    }

    // --- writes ---

    /// Insert or replace an instrument
    pub fn upsert_instrument(&mut self, row: Instrument) {
        let pk = row.instrument_id.clone();
        self.stage(TableName::Instruments, &pk);
        self.base.instruments.insert(pk, row);
    }

    /// Insert or replace an order
    pub fn upsert_order(&mut self, row: Order) {
        let pk = row.order_id.clone();
        self.stage(TableName::Orders, &pk);
        self.base.orders.insert(pk, row);
    }

    /// Insert or replace an execution
    pub fn upsert_execution(&mut self, row: Execution) {
        let pk = row.exec_id.clone();
        self.stage(TableName::Executions, &pk);
        self.base.executions.insert(pk, row);
    }

    /// Insert or replace a block
    pub fn upsert_block(&mut self, row: BlockTrade) {
        let pk = row.block_id.clone();
        self.stage(TableName::Blocks, &pk);
        self.base.blocks.insert(pk, row);
    }

    /// Insert or replace an allocation
    pub fn upsert_allocation(&mut self, row: Allocation) {
        let pk = row.alloc_id.clone();
        self.stage(TableName::Allocations, &pk);
        self.base.allocations.insert(pk, row);
    }

    /// Record a staged write for (table, pk), first observation wins.
    fn stage(&mut self, table: TableName, pk: &str) {
        if self.staged.iter().any(|s| s.table == table && s.pk == pk) {
            return;
        }
        let kind = if self.base.contains(table, pk) {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        self.staged.push(StagedWrite {
            table,
            pk: pk.to_string(),
            kind,
            observed_version: self.base.version(table, pk),
        });
    }

    /// Whether the transaction has staged any writes
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty()
    }

    // --- commit ---

    /// Commit atomically.
    ///
    /// Validates every staged row against the live version map; any row
    /// committed by another transaction since begin fails the whole commit
    /// with `Conflict` and nothing is applied. On success, change
    /// notifications are broadcast after the table lock is released and the
    /// same changes are returned in staging order.
    pub fn commit(self) -> Result<Vec<StoreChange>, StoreError> {
        let mut live = self.store.live.write().unwrap();

        for staged in &self.staged {
            let live_version = live.version(staged.table, &staged.pk);
            if live_version != staged.observed_version {
                return Err(StoreError::Conflict {
                    table: staged.table,
                    pk: staged.pk.clone(),
                });
            }
        }

        let mut changes = Vec::with_capacity(self.staged.len());
        for staged in &self.staged {
            live.adopt_row(&self.base, staged.table, &staged.pk);
            *live
                .versions
                .entry((staged.table, staged.pk.clone()))
                .or_insert(0) += 1;
            changes.push(StoreChange {
                table: staged.table,
                kind: staged.kind,
                pk: staged.pk.clone(),
            });
        }
        drop(live);

        for change in &changes {
            // No subscribers is fine; notifications are best-effort fan-out,
            // the committed change list is the authoritative copy.
            let _ = self.store.changes.send(change.clone());
        }
        Ok(changes)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use marlow_domain::{BlockStatus, Price, Quantity, SecurityType, Side, TradeDate};
    use rust_decimal_macros::dec;

    fn jan15() -> TradeDate {
        TradeDate::parse("20240115").unwrap()
    }

    fn instrument(id: &str) -> Instrument {
        Instrument {
            instrument_id: id.to_string(),
            security_type: SecurityType::Equity,
            isin: "US0378331005".to_string(),
            currency: "USD".to_string(),
            venue: "XNAS".to_string(),
        }
    }

    fn order(id: &str, account: &str, instrument: &str) -> Order {
        Order {
            order_id: id.to_string(),
            account_id: account.to_string(),
            instrument_id: instrument.to_string(),
            side: Side::Buy,
            qty: Quantity::new(dec!(100)).unwrap(),
            trader: "tr-1".to_string(),
        }
    }

    fn execution(id: &str, order_id: &str, qty: Decimal, price: Decimal) -> Execution {
        Execution {
            exec_id: id.to_string(),
            order_id: order_id.to_string(),
            instrument_id: "AAPL.O".to_string(),
            qty: Quantity::new(qty).unwrap(),
            price: Price::new(price).unwrap(),
            trade_date: jan15(),
            venue: "XNAS".to_string(),
        }
    }

    #[test]
    fn test_upsert_and_get_roundtrip() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.upsert_instrument(instrument("AAPL.O"));
        tx.upsert_order(order("O1", "A1", "AAPL.O"));
        tx.commit().unwrap();

        let tx = store.begin();
        assert_eq!(tx.instrument("AAPL.O").unwrap().currency, "USD");
        assert_eq!(tx.order("O1").unwrap().account_id, "A1");
        assert!(tx.instrument("MSFT.O").is_err());
    }

    #[test]
    fn test_read_your_writes_inside_tx() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.upsert_execution(execution("X1", "O1", dec!(100), dec!(10)));
        assert_eq!(tx.execution("X1").unwrap().order_id, "O1");
        // Not visible outside until commit
        assert!(store.execution("X1").is_none());
        tx.commit().unwrap();
        assert!(store.execution("X1").is_some());
    }

    #[test]
    fn test_single_not_found_and_not_unique() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.upsert_order(order("O1", "A1", "AAPL.O"));
        tx.upsert_order(order("O2", "A2", "AAPL.O"));
        tx.commit().unwrap();

        let tx = store.begin();
        let err = tx.orders_single(|o| o.order_id == "missing").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { table: TableName::Orders, .. }));

        let err = tx.orders_single(|o| o.instrument_id == "AAPL.O").unwrap_err();
        assert!(matches!(err, StoreError::NotUnique { table: TableName::Orders, matches: 2 }));
        assert!(!err.is_transient());

        let found = tx.orders_single(|o| o.account_id == "A2").unwrap();
        assert_eq!(found.order_id, "O2");
    }

    #[test]
    fn test_change_kinds_created_then_updated() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.upsert_execution(execution("X1", "O1", dec!(100), dec!(10)));
        let changes = tx.commit().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Created);
        assert_eq!(changes[0].table, TableName::Executions);

        let mut tx = store.begin();
        tx.upsert_execution(execution("X1", "O1", dec!(0), dec!(10)));
        let changes = tx.commit().unwrap();
        assert_eq!(changes[0].kind, ChangeKind::Updated);
        assert_eq!(changes[0].pk, "X1");
    }

    #[test]
    fn test_same_pk_twice_in_one_tx_is_one_change() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.upsert_execution(execution("X1", "O1", dec!(50), dec!(10)));
        tx.upsert_execution(execution("X1", "O1", dec!(75), dec!(10)));
        let changes = tx.commit().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Created);
        assert_eq!(store.execution("X1").unwrap().qty.as_decimal(), dec!(75));
    }

    #[test]
    fn test_write_conflict_first_committer_wins() {
        let store = MemoryStore::new();
        let mut tx1 = store.begin();
        let mut tx2 = store.begin();
        tx1.upsert_execution(execution("X1", "O1", dec!(100), dec!(10)));
        tx2.upsert_execution(execution("X1", "O1", dec!(200), dec!(11)));

        tx1.commit().unwrap();
        let err = tx2.commit().unwrap_err();
        assert!(matches!(err, StoreError::Conflict { table: TableName::Executions, .. }));
        assert!(err.is_transient());
        // Loser applied nothing
        assert_eq!(store.execution("X1").unwrap().qty.as_decimal(), dec!(100));
    }

    #[test]
    fn test_disjoint_commits_do_not_conflict() {
        let store = MemoryStore::new();
        let mut tx1 = store.begin();
        let mut tx2 = store.begin();
        tx1.upsert_execution(execution("X1", "O1", dec!(100), dec!(10)));
        tx2.upsert_execution(execution("X2", "O1", dec!(200), dec!(11)));
        tx1.commit().unwrap();
        tx2.commit().unwrap();
        assert_eq!(store.execution_count(), 2);
    }

    #[test]
    fn test_aggregates() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.upsert_execution(execution("X1", "O1", dec!(60), dec!(10.00)));
        tx.upsert_execution(execution("X2", "O1", dec!(40), dec!(11.00)));
        tx.upsert_execution(execution("X3", "O1", dec!(0), dec!(12.00)));
        tx.commit().unwrap();

        let tx = store.begin();
        let positive = |e: &Execution| e.qty.is_positive();
        assert_eq!(tx.executions_sum_qty(positive), dec!(100));
        assert_eq!(tx.executions_sum_notional(positive), dec!(1040.00));
        assert_eq!(tx.executions_all(|_| true).len(), 3);
    }

    #[tokio::test]
    async fn test_notifications_fire_after_commit() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        let mut tx = store.begin();
        tx.upsert_block(BlockTrade {
            block_id: "BLK-1".to_string(),
            instrument_id: "AAPL.O".to_string(),
            side: Side::Buy,
            trade_date: jan15(),
            gross_qty: Quantity::new(dec!(100)).unwrap(),
            avg_price: Price::new(dec!(10)).unwrap(),
            status: BlockStatus::ReadyToAllocate,
        });
        tx.commit().unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.table, TableName::Blocks);
        assert_eq!(change.kind, ChangeKind::Created);
        assert_eq!(change.pk, "BLK-1");
        // The committed row is already visible to the notified reader
        assert!(store.block("BLK-1").is_some());
    }
}
