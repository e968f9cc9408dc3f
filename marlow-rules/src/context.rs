//! Rule transaction context.
//!
//! A `RuleTx` brackets one rule invocation: store reads and staged writes go
//! through the embedded `StoreTx`, outbound effects accumulate as intents,
//! and `commit` lands both together - staged rows into the live tables,
//! intents into the outbox - before the caller advances the inbound offset.
//! If the store commit fails nothing reaches the outbox.

use std::ops::{Deref, DerefMut};

use marlow_domain::{SettlementInstruction, TradeEvent};
use marlow_outbox::{Outbox, OutboxIntent};
use marlow_store::{StoreChange, StoreError, StoreTx};

/// Transaction context handed to each rule.
pub struct RuleTx<'a> {
    tx: StoreTx<'a>,
    intents: Vec<OutboxIntent>,
}

impl<'a> RuleTx<'a> {
    /// Wrap an open store transaction.
    pub fn new(tx: StoreTx<'a>) -> Self {
        Self { tx, intents: Vec::new() }
    }

    /// Stage a trade event for publication after commit.
    pub fn publish(&mut self, event: TradeEvent) {
        self.intents.push(OutboxIntent::PublishEvent(event.envelope()));
    }

    /// Stage a settlement instruction for dispatch after commit.
    pub fn send_settlement(&mut self, instruction: SettlementInstruction) {
        self.intents.push(OutboxIntent::SendSettlement(instruction));
    }

    /// Number of staged outbound intents.
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    /// Commit store writes, then append the staged intents to the outbox.
    pub fn commit(self, outbox: &Outbox) -> Result<Vec<StoreChange>, StoreError> {
        let changes = self.tx.commit()?;
        outbox.append(self.intents);
        Ok(changes)
    }
}

impl<'a> Deref for RuleTx<'a> {
    type Target = StoreTx<'a>;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for RuleTx<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}
