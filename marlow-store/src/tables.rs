//! Table identity and change notifications.

use std::fmt;

/// The five projected tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    /// Static instrument reference data
    Instruments,
    /// Client orders
    Orders,
    /// Realized fills
    Executions,
    /// Aggregated block trades
    Blocks,
    /// Per-account allocations
    Allocations,
}

impl TableName {
    /// Canonical lowercase name, used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Instruments => "instruments",
            TableName::Orders => "orders",
            TableName::Executions => "executions",
            TableName::Blocks => "blocks",
            TableName::Allocations => "allocations",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a committed upsert inserted a fresh row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Row did not exist when the transaction first observed it
    Created,
    /// Row existed and was replaced
    Updated,
}

/// Post-commit change notification, delivered exactly once per committed
/// change, in commit order.
#[derive(Debug, Clone)]
pub struct StoreChange {
    /// Table the change landed in
    pub table: TableName,
    /// Created or updated
    pub kind: ChangeKind,
    /// Primary key of the changed row
    pub pk: String,
}
