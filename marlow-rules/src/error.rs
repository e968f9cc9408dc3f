//! Rule errors and their handling policy.

use thiserror::Error;

use marlow_store::StoreError;

/// Errors raised while firing a rule.
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    /// Ingest precondition failed (qty/price/date)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced order, instrument, block or allocation does not exist
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the worker does with a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Park the message, advance past it, alert
    DeadLetter,
    /// Redrive the message from the uncommitted inbound offset
    Retry,
    /// Invariant breach: stop the worker, page
    Halt,
}

impl RuleError {
    /// Policy per the error-handling table.
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            RuleError::Validation(_) => ErrorPolicy::DeadLetter,
            RuleError::MissingReference(_) => ErrorPolicy::DeadLetter,
            RuleError::Store(StoreError::NotUnique { .. }) => ErrorPolicy::Halt,
            RuleError::Store(StoreError::Conflict { .. }) => ErrorPolicy::Retry,
            // A pk lookup that raced a delete; nothing to redrive into
            RuleError::Store(StoreError::NotFound { .. }) => ErrorPolicy::DeadLetter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marlow_store::TableName;

    #[test]
    fn test_policy_mapping() {
        assert_eq!(RuleError::Validation("qty".into()).policy(), ErrorPolicy::DeadLetter);
        assert_eq!(RuleError::MissingReference("order".into()).policy(), ErrorPolicy::DeadLetter);
        assert_eq!(
            RuleError::Store(StoreError::NotUnique { table: TableName::Blocks, matches: 2 })
                .policy(),
            ErrorPolicy::Halt
        );
        assert_eq!(
            RuleError::Store(StoreError::Conflict {
                table: TableName::Executions,
                pk: "X1".into()
            })
            .policy(),
            ErrorPolicy::Retry
        );
    }
}
