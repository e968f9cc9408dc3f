//! Stub gateway for testing.
//!
//! Records every accepted instruction and can be scripted to fail the next
//! N sends, transiently or terminally, without real I/O.

use async_trait::async_trait;
use std::sync::RwLock;

use marlow_domain::SettlementInstruction;

use crate::error::GatewayError;
use crate::ports::SettlementGateway;

/// In-memory gateway double.
pub struct StubGateway {
    accepted: RwLock<Vec<SettlementInstruction>>,
    fail_queue: RwLock<Vec<GatewayError>>,
}

impl StubGateway {
    /// Stub that accepts everything.
    pub fn new() -> Self {
        Self {
            accepted: RwLock::new(Vec::new()),
            fail_queue: RwLock::new(Vec::new()),
        }
    }

    /// Script the next send(s) to fail with `error`, oldest first.
    pub fn push_failure(&self, error: GatewayError) {
        self.fail_queue.write().unwrap().push(error);
    }

    /// Instructions accepted so far, in arrival order.
    pub fn accepted(&self) -> Vec<SettlementInstruction> {
        self.accepted.read().unwrap().clone()
    }

    /// Number of accepted instructions.
    pub fn accepted_count(&self) -> usize {
        self.accepted.read().unwrap().len()
    }

    /// Idempotency keys of accepted instructions, in arrival order.
    pub fn idempotency_keys(&self) -> Vec<String> {
        self.accepted.read().unwrap().iter().map(|i| i.settle_id.clone()).collect()
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementGateway for StubGateway {
    async fn send(&self, instruction: &SettlementInstruction) -> Result<(), GatewayError> {
        let scripted = {
            let mut queue = self.fail_queue.write().unwrap();
            if queue.is_empty() { None } else { Some(queue.remove(0)) }
        };
        if let Some(error) = scripted {
            return Err(error);
        }
        self.accepted.write().unwrap().push(instruction.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marlow_domain::{SettleMethod, TradeDate};
    use rust_decimal_macros::dec;

    fn instruction(settle_id: &str) -> SettlementInstruction {
        SettlementInstruction {
            settle_id: settle_id.to_string(),
            alloc_id: "ALC-1".to_string(),
            account_id: "A1".to_string(),
            isin: "US0378331005".to_string(),
            settle_date: TradeDate::parse("20240117").unwrap(),
            method: SettleMethod::Dvp,
            cash_amount: dec!(1000.00),
        }
    }

    #[tokio::test]
    async fn test_stub_records_accepted_sends() {
        let stub = StubGateway::new();
        stub.send(&instruction("STL-1")).await.unwrap();
        stub.send(&instruction("STL-2")).await.unwrap();
        assert_eq!(stub.accepted_count(), 2);
        assert_eq!(stub.idempotency_keys(), vec!["STL-1", "STL-2"]);
    }

    #[tokio::test]
    async fn test_scripted_failures_drain_in_order() {
        let stub = StubGateway::new();
        stub.push_failure(GatewayError::Status { status: 503, body: String::new() });
        stub.push_failure(GatewayError::Status { status: 404, body: String::new() });

        let first = stub.send(&instruction("STL-1")).await.unwrap_err();
        assert!(!first.is_terminal());
        let second = stub.send(&instruction("STL-1")).await.unwrap_err();
        assert!(second.is_terminal());

        // Queue drained; next send succeeds
        stub.send(&instruction("STL-1")).await.unwrap();
        assert_eq!(stub.accepted_count(), 1);
    }
}
