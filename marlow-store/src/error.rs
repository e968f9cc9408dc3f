//! Storage layer errors

use thiserror::Error;

use crate::tables::TableName;

/// Errors that can occur in the storage layer
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A `single` predicate matched no row, or a pk lookup missed
    #[error("No row in {table}: {detail}")]
    NotFound {
        /// Table queried
        table: TableName,
        /// What was looked for
        detail: String,
    },

    /// A `single` predicate matched more than one row.
    ///
    /// This is an invariant breach, not a transient condition: the caller is
    /// expected to halt rather than retry.
    #[error("Predicate over {table} matched {matches} rows, expected one")]
    NotUnique {
        /// Table queried
        table: TableName,
        /// Number of rows matched
        matches: usize,
    },

    /// A concurrent transaction committed a row this transaction wrote.
    /// Transient; the rule is redriven from the inbound offset.
    #[error("Write conflict on {table} pk {pk}")]
    Conflict {
        /// Table written
        table: TableName,
        /// Primary key that conflicted
        pk: String,
    },
}

impl StoreError {
    /// True for errors the runtime may retry (everything except NotUnique).
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Shorthand for a pk miss.
    pub fn not_found(table: TableName, pk: impl Into<String>) -> Self {
        Self::NotFound { table, detail: pk.into() }
    }
}
