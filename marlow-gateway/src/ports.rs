//! Gateway port definition.
//!
//! The pipeline talks to the settlement gateway through this port; the
//! reqwest adapter implements it for the real service and the stub stands in
//! for tests.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use marlow_domain::SettlementInstruction;

use crate::error::GatewayError;

/// Port for dispatching settlement instructions.
///
/// Implementations:
/// - `HttpSettlementGateway` - reqwest adapter for the real gateway
/// - `StubGateway` - for testing (records instructions, scriptable failures)
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Deliver one settlement instruction.
    ///
    /// The instruction's `settle_id` doubles as the idempotency key, so
    /// redelivery after a crash or redrive is safe. Implementations retry
    /// transient failures internally within the configured retry budget;
    /// a returned error is either terminal or the exhausted budget.
    async fn send(&self, instruction: &SettlementInstruction) -> Result<(), GatewayError>;
}

// =============================================================================
// Retry policy
// =============================================================================

/// Exponential backoff schedule with jitter.
///
/// Defaults follow the gateway contract: 250 ms initial, 30 s cap, ±20 %
/// jitter. `max_elapsed` bounds the otherwise-indefinite retry loop to the
/// outbound-effect TTL; an undrained entry is redriven later.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First backoff delay
    pub initial: Duration,
    /// Backoff ceiling
    pub cap: Duration,
    /// Jitter fraction applied symmetrically (0.2 = ±20 %)
    pub jitter: f64,
    /// Total retry budget per send
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            cap: Duration::from_secs(30),
            jitter: 0.2,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial.as_millis().saturating_mul(1u128 << attempt.min(20).saturating_sub(1));
        let base = exp.min(self.cap.as_millis()) as f64;
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_millis((base * factor).max(1.0) as u64)
    }
}
