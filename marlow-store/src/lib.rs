//! Marlow Store Layer
//!
//! Transactional projection of the five post-trade tables with primary-key
//! upsert, predicate queries (`single` / `all`), aggregation, and post-commit
//! change notifications.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod tables;

pub use error::StoreError;
pub use memory::{MemoryStore, StoreTx};
pub use tables::{ChangeKind, StoreChange, TableName};
